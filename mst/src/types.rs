//! Types used by the multi-signature transaction state.

use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{
    varint::UInt, Encode, EncodeSize, Error as CodecError, RangeCfg, Read, ReadExt, Write,
};
use commonware_cryptography::{Committable, Hasher, PublicKey, Signer, Verifier};
use commonware_utils::union;
use std::{collections::BTreeMap, fmt, marker::PhantomData};

/// Errors that may be encountered when submitting a batch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The batch contains no transactions.
    #[error("batch has no transactions")]
    EmptyBatch,
    /// A transaction arrived without any candidate signatures.
    #[error("transaction {0} has no signatures")]
    NoSignatures(usize),
    /// The batch disagrees with a stored batch of the same identity on transaction count.
    #[error("transaction count mismatch: stored {stored}, received {received}")]
    LengthMismatch {
        /// Number of transactions in the stored batch.
        stored: usize,
        /// Number of transactions in the received batch.
        received: usize,
    },
    /// The state holds the maximum number of in-flight batches.
    #[error("state at capacity ({0} batches)")]
    Overloaded(usize),
    /// Unable to send a message over the network.
    #[error("unable to send message")]
    UnableToSendMessage,
}

/// Milliseconds since the Unix epoch, measured on the local clock.
pub type Timestamp = u64;

/// Suffix used to identify transaction signatures for domain separation.
/// Prevents signatures produced here from being reused by other message types.
const TX_SUFFIX: &[u8] = b"_MST_TX";

/// Returns the suffixed namespace used to sign and verify transaction payloads.
#[inline]
pub(crate) fn tx_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TX_SUFFIX)
}

/// A single transaction: an opaque payload, its quorum descriptor, a deadline,
/// and the signatures gathered so far.
///
/// The signature set is monotone for the lifetime of the transaction: signatures
/// are only added, never removed or replaced. Keying by public key gives one
/// signature per signatory and deterministic iteration order.
pub struct Transaction<P: PublicKey, H: Hasher> {
    /// Opaque transaction payload.
    pub payload: Bytes,
    /// Number of distinct valid signatures (or total signatory weight, depending
    /// on the configured [Completer](crate::Completer)) required for completion.
    pub quorum: u32,
    /// Deadline after which the transaction may be discarded.
    pub deadline: Timestamp,
    /// Signatures gathered so far, keyed by signatory.
    pub signatures: BTreeMap<P, P::Signature>,

    _hasher: PhantomData<H>,
}

impl<P: PublicKey, H: Hasher> Transaction<P, H> {
    /// Creates a new transaction with no signatures.
    pub fn new(payload: Bytes, quorum: u32, deadline: Timestamp) -> Self {
        Self {
            payload,
            quorum,
            deadline,
            signatures: BTreeMap::new(),
            _hasher: PhantomData,
        }
    }

    /// Digest of the immutable part of the transaction (everything but the
    /// signatures). This is the message signatories sign, so the quorum
    /// descriptor and deadline cannot be tampered with without breaking every
    /// signature (and changing the batch identity).
    pub fn payload_digest(&self) -> H::Digest {
        let mut hasher = H::new();
        hasher.update(&self.payload);
        hasher.update(&UInt(self.quorum).encode());
        hasher.update(&UInt(self.deadline).encode());
        hasher.finalize()
    }

    /// Signs the transaction, adding the signer's signature to the set.
    pub fn sign<S: Signer<PublicKey = P, Signature = P::Signature>>(
        &mut self,
        scheme: &S,
        namespace: &[u8],
    ) {
        let digest = self.payload_digest();
        let signature = scheme.sign(Some(&tx_namespace(namespace)), digest.as_ref());
        self.signatures.insert(scheme.public_key(), signature);
    }

    /// Attempts to add a signature from `public_key`.
    ///
    /// Returns `true` iff the signature was newly inserted: the signatory must
    /// not already be present and the signature must verify against the
    /// transaction's payload digest.
    pub fn add_signature(&mut self, public_key: P, signature: P::Signature, namespace: &[u8]) -> bool {
        if self.signatures.contains_key(&public_key) {
            return false;
        }
        let digest = self.payload_digest();
        if !public_key.verify(Some(&tx_namespace(namespace)), digest.as_ref(), &signature) {
            return false;
        }
        self.signatures.insert(public_key, signature);
        true
    }
}

impl<P: PublicKey, H: Hasher> Clone for Transaction<P, H> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            quorum: self.quorum,
            deadline: self.deadline,
            signatures: self.signatures.clone(),
            _hasher: PhantomData,
        }
    }
}

impl<P: PublicKey, H: Hasher> PartialEq for Transaction<P, H> {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
            && self.quorum == other.quorum
            && self.deadline == other.deadline
            && self.signatures == other.signatures
    }
}

impl<P: PublicKey, H: Hasher> Eq for Transaction<P, H> {}

impl<P: PublicKey, H: Hasher> fmt::Debug for Transaction<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("payload", &self.payload)
            .field("quorum", &self.quorum)
            .field("deadline", &self.deadline)
            .field("signatures", &self.signatures.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<P: PublicKey, H: Hasher> Write for Transaction<P, H> {
    fn write(&self, writer: &mut impl BufMut) {
        self.payload.write(writer);
        UInt(self.quorum).write(writer);
        UInt(self.deadline).write(writer);
        self.signatures.write(writer);
    }
}

impl<P: PublicKey, H: Hasher> Read for Transaction<P, H> {
    /// Bounds on the payload size and the number of signatures.
    type Cfg = (RangeCfg, RangeCfg);

    fn read_cfg(reader: &mut impl Buf, (payload, signatures): &Self::Cfg) -> Result<Self, CodecError> {
        let payload = Bytes::read_cfg(reader, payload)?;
        let quorum = UInt::read(reader)?.into();
        let deadline = UInt::read(reader)?.into();
        let signatures = BTreeMap::read_cfg(reader, &(signatures.clone(), ((), ())))?;
        Ok(Self {
            payload,
            quorum,
            deadline,
            signatures,
            _hasher: PhantomData,
        })
    }
}

impl<P: PublicKey, H: Hasher> EncodeSize for Transaction<P, H> {
    fn encode_size(&self) -> usize {
        self.payload.encode_size()
            + UInt(self.quorum).encode_size()
            + UInt(self.deadline).encode_size()
            + self.signatures.encode_size()
    }
}

/// An ordered, non-empty group of transactions that completes or expires as a
/// unit: the batch is complete iff every transaction in it has gathered its
/// quorum, and the batch expires at the earliest transaction deadline.
pub struct Batch<P: PublicKey, H: Hasher> {
    /// The transactions in the batch, in submission order.
    pub transactions: Vec<Transaction<P, H>>,
}

impl<P: PublicKey, H: Hasher> Batch<P, H> {
    /// Creates a new batch from the given transactions.
    pub fn new(transactions: Vec<Transaction<P, H>>) -> Self {
        Self { transactions }
    }

    /// The earliest deadline across the batch's transactions.
    pub fn earliest_expiry(&self) -> Timestamp {
        self.transactions
            .iter()
            .map(|tx| tx.deadline)
            .min()
            .unwrap_or(0)
    }
}

impl<P: PublicKey, H: Hasher> Committable for Batch<P, H> {
    type Commitment = H::Digest;

    /// The batch identity: a digest over the payload digests of the batch's
    /// transactions, in order. Independent of which signatures have been
    /// gathered, so batches on different peers that carry the same payloads
    /// share an identity and can be merged.
    fn commitment(&self) -> H::Digest {
        let mut hasher = H::new();
        for tx in &self.transactions {
            hasher.update(tx.payload_digest().as_ref());
        }
        hasher.finalize()
    }
}

impl<P: PublicKey, H: Hasher> Clone for Batch<P, H> {
    fn clone(&self) -> Self {
        Self {
            transactions: self.transactions.clone(),
        }
    }
}

impl<P: PublicKey, H: Hasher> PartialEq for Batch<P, H> {
    fn eq(&self, other: &Self) -> bool {
        self.transactions == other.transactions
    }
}

impl<P: PublicKey, H: Hasher> Eq for Batch<P, H> {}

impl<P: PublicKey, H: Hasher> fmt::Debug for Batch<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("identity", &self.commitment())
            .field("transactions", &self.transactions)
            .finish()
    }
}

impl<P: PublicKey, H: Hasher> Write for Batch<P, H> {
    fn write(&self, writer: &mut impl BufMut) {
        self.transactions.write(writer);
    }
}

impl<P: PublicKey, H: Hasher> Read for Batch<P, H> {
    /// Bounds on the number of transactions and each transaction's contents.
    type Cfg = (RangeCfg, <Transaction<P, H> as Read>::Cfg);

    fn read_cfg(reader: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let transactions = Vec::read_cfg(reader, cfg)?;
        Ok(Self { transactions })
    }
}

impl<P: PublicKey, H: Hasher> EncodeSize for Batch<P, H> {
    fn encode_size(&self) -> usize {
        self.transactions.encode_size()
    }
}

/// Used as [Reporter::Activity](crate::Reporter::Activity) to report batches
/// moving through the state.
pub enum Activity<P: PublicKey, H: Hasher> {
    /// A batch reached quorum on every transaction and left the state.
    /// Reported exactly once per completion within a state instance.
    Completed(Batch<P, H>),
    /// A batch passed its earliest deadline and left the state.
    /// Reported exactly once per expiry.
    Expired(Batch<P, H>),
    /// A batch gained signatures (or was first observed) without completing.
    Updated(H::Digest),
}

impl<P: PublicKey, H: Hasher> Clone for Activity<P, H> {
    fn clone(&self) -> Self {
        match self {
            Activity::Completed(batch) => Activity::Completed(batch.clone()),
            Activity::Expired(batch) => Activity::Expired(batch.clone()),
            Activity::Updated(id) => Activity::Updated(*id),
        }
    }
}

impl<P: PublicKey, H: Hasher> PartialEq for Activity<P, H> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Activity::Completed(a), Activity::Completed(b)) => a == b,
            (Activity::Expired(a), Activity::Expired(b)) => a == b,
            (Activity::Updated(a), Activity::Updated(b)) => a == b,
            _ => false,
        }
    }
}

impl<P: PublicKey, H: Hasher> fmt::Debug for Activity<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Completed(batch) => f.debug_tuple("Completed").field(batch).finish(),
            Activity::Expired(batch) => f.debug_tuple("Expired").field(batch).finish(),
            Activity::Updated(id) => f.debug_tuple("Updated").field(id).finish(),
        }
    }
}
