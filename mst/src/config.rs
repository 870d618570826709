use std::time::Duration;

/// Configuration for the [Engine](super::Engine).
pub struct Config<C, Z> {
    /// Decides when a batch has gathered enough signatures, and when it has
    /// expired.
    pub completer: C,

    /// Notified when a batch completes, expires, or makes progress.
    pub reporter: Z,

    /// The application namespace used to sign and verify transaction payloads.
    /// Prevents replay attacks on other applications.
    pub namespace: Vec<u8>,

    /// The maximum size of the mailbox backlog.
    pub mailbox_size: usize,

    /// Whether gossip messages are sent as priority.
    pub priority: bool,

    /// How often the local state is broadcast to peers.
    pub gossip_period: Duration,

    /// How often expired batches are evicted.
    pub expiry_period: Duration,

    /// Subtracted from the local clock before comparing against batch
    /// deadlines, to tolerate small clock skew between peers.
    pub expiry_grace: Duration,

    /// Maximum number of in-flight batches; `None` for unbounded. When full,
    /// submissions of new batches fail with
    /// [Error::Overloaded](crate::types::Error::Overloaded) until completions
    /// or expiries make room.
    pub max_inflight: Option<usize>,

    /// The maximum number of batches accepted in a single peer state message.
    pub max_batches: usize,

    /// The maximum number of transactions accepted per batch.
    pub max_transactions: usize,

    /// The maximum number of signatures accepted per transaction.
    pub max_signatures: usize,

    /// The maximum payload size accepted per transaction, in bytes.
    pub max_payload: usize,
}

impl<C, Z> Config<C, Z> {
    /// Assert that all configuration values are valid.
    pub fn assert(&self) {
        assert_ne!(self.mailbox_size, 0, "mailbox_size must be non-zero");
        assert_ne!(
            self.gossip_period,
            Duration::from_millis(0),
            "gossip_period must be greater than 0"
        );
        assert_ne!(
            self.expiry_period,
            Duration::from_millis(0),
            "expiry_period must be greater than 0"
        );
        assert_ne!(self.max_batches, 0, "max_batches must be non-zero");
        assert_ne!(self.max_transactions, 0, "max_transactions must be non-zero");
        assert_ne!(self.max_signatures, 0, "max_signatures must be non-zero");
        if let Some(max_inflight) = self.max_inflight {
            assert_ne!(max_inflight, 0, "max_inflight must be non-zero");
        }
    }
}
