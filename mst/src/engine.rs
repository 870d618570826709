use crate::{
    ingress::{Mailbox, Message},
    metrics,
    state::MstState,
    types::{Activity, Batch, Error},
    Completer, Config, Reporter,
};
use commonware_codec::RangeCfg;
use commonware_cryptography::{Committable, Hasher, PublicKey};
use commonware_macros::select;
use commonware_p2p::{utils::codec::wrap, Receiver, Recipients, Sender};
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use commonware_utils::SystemTimeExt;
use futures::{
    channel::{mpsc, oneshot},
    StreamExt,
};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Decode bounds for a peer state message: the batch count, and per batch the
/// transaction count, payload size, and signature count.
type StateCfg = (
    RangeCfg,
    (RangeCfg, (RangeCfg, RangeCfg)),
);

/// Gossip driver for the multi-signature transaction state.
///
/// It is responsible for:
/// - Accepting batch submissions from local clients
/// - Periodically broadcasting the local state to peers
/// - Merging states received from peers
/// - Evicting expired batches
/// - Reporting completions, expiries, and progress to the [Reporter]
pub struct Engine<
    E: Clock + Spawner + Metrics,
    P: PublicKey,
    H: Hasher,
    C: Completer<P, H>,
    Z: Reporter<Activity = Activity<P, H>>,
> {
    ////////////////////////////////////////
    // Interfaces
    ////////////////////////////////////////
    context: E,
    reporter: Z,

    ////////////////////////////////////////
    // Configuration
    ////////////////////////////////////////
    /// Whether gossip messages are sent as priority
    priority: bool,

    /// How often the local state is broadcast to peers
    gossip_period: Duration,

    /// How often expired batches are evicted
    expiry_period: Duration,

    /// Clock-skew tolerance subtracted from the local clock before eviction
    expiry_grace: Duration,

    /// Configuration for decoding peer state messages
    codec_config: StateCfg,

    ////////////////////////////////////////
    // Messaging
    ////////////////////////////////////////
    /// The mailbox for receiving messages
    mailbox_receiver: mpsc::Receiver<Message<P, H>>,

    ////////////////////////////////////////
    // State
    ////////////////////////////////////////
    /// The in-flight batches, keyed by identity
    state: MstState<P, H, C>,

    ////////////////////////////////////////
    // Metrics
    ////////////////////////////////////////
    /// Metrics
    metrics: metrics::Metrics,
}

impl<
        E: Clock + Spawner + Metrics,
        P: PublicKey,
        H: Hasher,
        C: Completer<P, H>,
        Z: Reporter<Activity = Activity<P, H>>,
    > Engine<E, P, H, C, Z>
{
    /// Creates a new engine with the given context and configuration.
    /// Returns the engine and a mailbox for sending messages to the engine.
    pub fn new(context: E, cfg: Config<C, Z>) -> (Self, Mailbox<P, H>) {
        cfg.assert();
        let (mailbox_sender, mailbox_receiver) = mpsc::channel(cfg.mailbox_size);
        let mailbox = Mailbox::new(mailbox_sender);
        let metrics = metrics::Metrics::init(&context);

        let state = match cfg.max_inflight {
            Some(max_inflight) => MstState::bounded(cfg.completer, &cfg.namespace, max_inflight),
            None => MstState::new(cfg.completer, &cfg.namespace),
        };
        let codec_config = (
            RangeCfg::from(1..=cfg.max_batches),
            (
                RangeCfg::from(1..=cfg.max_transactions),
                (
                    RangeCfg::from(..=cfg.max_payload),
                    RangeCfg::from(..=cfg.max_signatures),
                ),
            ),
        );

        let result = Self {
            context,
            reporter: cfg.reporter,
            priority: cfg.priority,
            gossip_period: cfg.gossip_period,
            expiry_period: cfg.expiry_period,
            expiry_grace: cfg.expiry_grace,
            codec_config,
            mailbox_receiver,
            state,
            metrics,
        };

        (result, mailbox)
    }

    /// Starts the engine with the given network.
    pub fn start(
        mut self,
        network: (impl Sender<PublicKey = P>, impl Receiver<PublicKey = P>),
    ) -> Handle<()> {
        self.context.spawn_ref()(self.run(network))
    }

    /// Inner run loop called by `start`.
    async fn run(
        mut self,
        network: (impl Sender<PublicKey = P>, impl Receiver<PublicKey = P>),
    ) {
        let (mut sender, mut receiver) = wrap(self.codec_config.clone(), network.0, network.1);
        let mut shutdown = self.context.stopped();
        let mut next_gossip = self.context.current() + self.gossip_period;
        let mut next_expiry = self.context.current() + self.expiry_period;

        loop {
            self.metrics.pending.set(self.state.len() as i64);

            select! {
                // Handle shutdown signal
                _ = &mut shutdown => {
                    debug!("shutdown");
                    break;
                },

                // Broadcast the local state to peers
                _ = self.context.sleep_until(next_gossip) => {
                    next_gossip = self.context.current() + self.gossip_period;
                    if self.state.is_empty() {
                        continue;
                    }
                    let state = self.state.batches();
                    trace!(batches = state.len(), "gossip");
                    if let Err(err) = sender
                        .send(Recipients::All, state, self.priority)
                        .await
                    {
                        warn!(?err, "failed to send state");
                    }
                },

                // Evict expired batches
                _ = self.context.sleep_until(next_expiry) => {
                    next_expiry = self.context.current() + self.expiry_period;
                    let now = self
                        .context
                        .current()
                        .epoch_millis()
                        .saturating_sub(self.expiry_grace.as_millis() as u64);
                    let expired = self.state.erase_by_time(now);
                    for batch in expired.batches() {
                        debug!(batch = %batch.commitment(), "batch expired");
                        self.metrics.expired.inc();
                        self.reporter.report(Activity::Expired(batch)).await;
                    }
                },

                // Handle mailbox messages
                mail = self.mailbox_receiver.next() => {
                    let Some(msg) = mail else {
                        error!("mailbox receiver failed");
                        break;
                    };
                    match msg {
                        Message::Submit { batch, responder } => {
                            trace!("mailbox: submit");
                            self.handle_submit(batch, responder).await;
                        }
                        Message::Batches { responder } => {
                            trace!("mailbox: batches");
                            let _ = responder.send(self.state.batches());
                        }
                    }
                },

                // Handle incoming peer states
                msg = receiver.recv() => {
                    // Error handling
                    let (peer, msg) = match msg {
                        Ok(r) => r,
                        Err(err) => {
                            error!(?err, "receiver failed");
                            break;
                        }
                    };

                    // Decode the message
                    let batches = match msg {
                        Ok(batches) => batches,
                        Err(err) => {
                            warn!(?err, ?peer, "failed to decode peer state");
                            continue;
                        }
                    };

                    trace!(?peer, batches = batches.len(), "network");
                    self.handle_peer_state(batches).await;
                },
            }
        }
    }

    ////////////////////////////////////////
    // Handling
    ////////////////////////////////////////

    /// Handles a `submit` request from a local client.
    async fn handle_submit(
        &mut self,
        batch: Batch<P, H>,
        responder: oneshot::Sender<Result<(), Error>>,
    ) {
        let id = batch.commitment();
        match self.state.insert(batch) {
            Err(err) => {
                debug!(?err, batch = %id, "submission rejected");
                self.metrics.rejected_submissions.inc();
                let _ = responder.send(Err(err));
            }
            Ok(insertion) => {
                if insertion.rejected > 0 {
                    self.metrics
                        .rejected_signatures
                        .inc_by(insertion.rejected as u64);
                }
                let _ = responder.send(Ok(()));
                if let Some(batch) = insertion.completed {
                    debug!(batch = %id, "batch completed");
                    self.metrics.completed.inc();
                    self.reporter.report(Activity::Completed(batch)).await;
                } else if insertion.updated {
                    self.reporter.report(Activity::Updated(id)).await;
                }
            }
        }
    }

    /// Handles a state received from a peer.
    async fn handle_peer_state(&mut self, batches: Vec<Batch<P, H>>) {
        let merge = self.state.merge_batches(batches);
        self.metrics.merges.inc();
        if merge.rejected > 0 {
            self.metrics
                .rejected_signatures
                .inc_by(merge.rejected as u64);
        }
        if merge.dropped > 0 {
            self.metrics.dropped_batches.inc_by(merge.dropped as u64);
        }
        for batch in merge.completed.batches() {
            debug!(batch = %batch.commitment(), "batch completed");
            self.metrics.completed.inc();
            self.reporter.report(Activity::Completed(batch)).await;
        }
        for id in merge.updated {
            self.reporter.report(Activity::Updated(id)).await;
        }
    }
}
