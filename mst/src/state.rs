//! The multi-signature transaction state: a commutative, idempotent merge
//! structure accumulating partial signatures until completion.

use crate::{
    types::{tx_namespace, Batch, Error, Timestamp},
    Completer,
};
use commonware_cryptography::{Committable, Hasher, PublicKey, Verifier};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
    fmt,
};
use tracing::trace;

/// Outcome of inserting a single batch.
pub struct Insertion<P: PublicKey, H: Hasher> {
    /// The batch, if the insert completed it. Completed batches are extracted,
    /// never stored.
    pub completed: Option<Batch<P, H>>,
    /// Whether the insert mutated the state (or completed the batch).
    pub updated: bool,
    /// Signatures dropped for failing verification or for duplicating a
    /// signatory already present.
    pub rejected: usize,
}

impl<P: PublicKey, H: Hasher> PartialEq for Insertion<P, H> {
    fn eq(&self, other: &Self) -> bool {
        self.completed == other.completed
            && self.updated == other.updated
            && self.rejected == other.rejected
    }
}

impl<P: PublicKey, H: Hasher> fmt::Debug for Insertion<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Insertion")
            .field("completed", &self.completed)
            .field("updated", &self.updated)
            .field("rejected", &self.rejected)
            .finish()
    }
}

/// Outcome of merging a peer state.
pub struct Merge<P: PublicKey, H: Hasher, C: Completer<P, H>> {
    /// Batches the merge completed, keyed (and therefore sorted) by identity.
    pub completed: MstState<P, H, C>,
    /// Identities that gained signatures (or were first observed) without
    /// completing.
    pub updated: Vec<H::Digest>,
    /// Signatures dropped for failing verification or for duplicating a
    /// signatory already present.
    pub rejected: usize,
    /// Batches dropped for being malformed or exceeding capacity.
    pub dropped: usize,
}

/// Merges signatures from `donor` into `target`.
///
/// Both batches must share an identity (and therefore a transaction count):
/// transactions are paired positionally. A signature is adopted iff its
/// signatory is not already present and it verifies against the transaction's
/// payload digest, so the merge is closed under Byzantine input.
///
/// Returns whether any signature was newly adopted, and the number dropped
/// (failed verification or duplicated a signatory already present).
fn merge_signatures<P: PublicKey, H: Hasher>(
    target: &mut Batch<P, H>,
    donor: &Batch<P, H>,
    namespace: &[u8],
) -> (bool, usize) {
    let mut added = false;
    let mut rejected = 0;
    for (target_tx, donor_tx) in target
        .transactions
        .iter_mut()
        .zip(donor.transactions.iter())
    {
        let digest = target_tx.payload_digest();
        for (signatory, signature) in &donor_tx.signatures {
            if target_tx.signatures.contains_key(signatory) {
                rejected += 1;
                continue;
            }
            if !signatory.verify(Some(namespace), digest.as_ref(), signature) {
                rejected += 1;
                continue;
            }
            target_tx
                .signatures
                .insert(signatory.clone(), signature.clone());
            added = true;
        }
    }
    (added, rejected)
}

/// A set of in-flight batches keyed by identity, indexed by expiry for
/// time-driven eviction.
///
/// Merging is a join over signature sets: two peers that exchange and merge
/// their states converge to the same signatures for every shared identity,
/// regardless of order (the merge is commutative, associative, and
/// idempotent). Expiry is the one non-monotone operation: entries disappear
/// once the local clock passes their earliest deadline.
///
/// The expiry index may hold stale entries (an identity that completed, or a
/// duplicate from re-observing an identity). Entries are validated against the
/// authoritative map on pop and discarded if stale. Because a transaction's
/// deadline is covered by its payload digest, a stored batch's earliest expiry
/// never changes after insertion.
#[derive(Clone)]
pub struct MstState<P: PublicKey, H: Hasher, C: Completer<P, H>> {
    completer: C,
    namespace: Vec<u8>,
    capacity: Option<usize>,
    entries: BTreeMap<H::Digest, Batch<P, H>>,
    index: BinaryHeap<Reverse<(Timestamp, H::Digest)>>,
}

impl<P: PublicKey, H: Hasher, C: Completer<P, H>> MstState<P, H, C> {
    /// Creates an empty state.
    ///
    /// `namespace` domain-separates the signatures this state accepts from
    /// those of other applications.
    pub fn new(completer: C, namespace: &[u8]) -> Self {
        Self {
            completer,
            namespace: tx_namespace(namespace),
            capacity: None,
            entries: BTreeMap::new(),
            index: BinaryHeap::new(),
        }
    }

    /// Creates an empty state that holds at most `max_inflight` batches.
    /// Once full, inserts of new identities fail with [Error::Overloaded]
    /// until completions or expiries make room.
    pub fn bounded(completer: C, namespace: &[u8], max_inflight: usize) -> Self {
        Self {
            capacity: Some(max_inflight),
            ..Self::new(completer, namespace)
        }
    }

    /// Builds a carrier of results: a state with the same completer and
    /// namespace holding exactly `entries`.
    fn collect(&self, entries: BTreeMap<H::Digest, Batch<P, H>>) -> Self {
        let index = entries
            .iter()
            .map(|(id, batch)| Reverse((batch.earliest_expiry(), *id)))
            .collect();
        Self {
            completer: self.completer.clone(),
            namespace: self.namespace.clone(),
            capacity: None,
            entries,
            index,
        }
    }

    /// Inserts a batch, merging its signatures into any stored batch of the
    /// same identity.
    ///
    /// Signatures that fail verification, or that duplicate a signatory
    /// already present, are dropped silently and counted in
    /// [Insertion::rejected]. If the batch reaches quorum on every transaction
    /// it is returned in [Insertion::completed] and not stored.
    ///
    /// Errors are returned only for malformed batches (no transactions, a
    /// transaction with no candidate signatures, or a transaction count that
    /// disagrees with a stored batch of the same identity) and for capacity
    /// violations; the state is unchanged in every error case.
    pub fn insert(&mut self, batch: Batch<P, H>) -> Result<Insertion<P, H>, Error> {
        if batch.transactions.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if let Some(at) = batch
            .transactions
            .iter()
            .position(|tx| tx.signatures.is_empty())
        {
            return Err(Error::NoSignatures(at));
        }

        let id = batch.commitment();
        if let Some(stored) = self.entries.get_mut(&id) {
            if stored.transactions.len() != batch.transactions.len() {
                return Err(Error::LengthMismatch {
                    stored: stored.transactions.len(),
                    received: batch.transactions.len(),
                });
            }
            let (added, rejected) = merge_signatures(stored, &batch, &self.namespace);
            if self.completer.is_complete(stored) {
                let stored = self.entries.remove(&id).expect("entry must exist");
                // The expiry-index entry for this identity goes stale; it is
                // discarded when popped.
                trace!(batch = %id, "batch completed");
                return Ok(Insertion {
                    completed: Some(stored),
                    updated: added,
                    rejected,
                });
            }
            return Ok(Insertion {
                completed: None,
                updated: added,
                rejected,
            });
        }

        // First observation of this identity: keep only signatures that verify.
        let mut batch = batch;
        let mut rejected = 0;
        for tx in batch.transactions.iter_mut() {
            let digest = tx.payload_digest();
            let before = tx.signatures.len();
            tx.signatures
                .retain(|signatory, signature| signatory.verify(Some(&self.namespace), digest.as_ref(), signature));
            rejected += before - tx.signatures.len();
        }
        if batch.transactions.iter().all(|tx| tx.signatures.is_empty()) {
            // Nothing verifiable survived; absorb without storing.
            trace!(batch = %id, rejected, "batch had no valid signatures");
            return Ok(Insertion {
                completed: None,
                updated: false,
                rejected,
            });
        }
        if self.completer.is_complete(&batch) {
            trace!(batch = %id, "batch completed on first observation");
            return Ok(Insertion {
                completed: Some(batch),
                updated: true,
                rejected,
            });
        }
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                return Err(Error::Overloaded(capacity));
            }
        }
        self.index.push(Reverse((batch.earliest_expiry(), id)));
        self.entries.insert(id, batch);
        Ok(Insertion {
            completed: None,
            updated: true,
            rejected,
        })
    }

    /// Merges a peer's state into this one by applying the insert algorithm to
    /// each of its batches.
    ///
    /// Which batches complete is independent of the order entries are
    /// processed in; only the reporting order may differ.
    pub fn merge(&mut self, other: Self) -> Merge<P, H, C> {
        self.merge_batches(other.entries.into_values())
    }

    /// Merges a list of batches (a peer state in wire form) into this one.
    ///
    /// Peer input is untrusted: malformed batches and batches that would
    /// exceed capacity are dropped (and counted) rather than surfaced, so a
    /// merge never partially fails.
    pub fn merge_batches(&mut self, batches: impl IntoIterator<Item = Batch<P, H>>) -> Merge<P, H, C> {
        let mut completed = BTreeMap::new();
        let mut updated = Vec::new();
        let mut rejected = 0;
        let mut dropped = 0;
        for batch in batches {
            let id = batch.commitment();
            match self.insert(batch) {
                Ok(insertion) => {
                    rejected += insertion.rejected;
                    if let Some(batch) = insertion.completed {
                        completed.insert(id, batch);
                    } else if insertion.updated {
                        updated.push(id);
                    }
                }
                Err(err) => {
                    trace!(?err, batch = %id, "dropped batch");
                    dropped += 1;
                }
            }
        }
        Merge {
            completed: self.collect(completed),
            updated,
            rejected,
            dropped,
        }
    }

    /// Returns the entries present in this state but not in `other`, by
    /// identity. Used to gossip only what a peer has not yet seen.
    pub fn diff(&self, other: &Self) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(id, _)| !other.entries.contains_key(*id))
            .map(|(id, batch)| (*id, batch.clone()))
            .collect();
        self.collect(entries)
    }

    /// Removes and returns every batch whose expiry has passed at `now`.
    ///
    /// Pops the expiry index until its minimum is in the future, validating
    /// each entry against the map (stale entries are discarded silently).
    /// Amortizes to O(k log n) for k expirations.
    pub fn erase_by_time(&mut self, now: Timestamp) -> Self {
        let mut expired = BTreeMap::new();
        let mut retained = Vec::new();
        while let Some(&Reverse((expiry, id))) = self.index.peek() {
            if expiry > now {
                break;
            }
            self.index.pop();
            let Some(batch) = self.entries.get(&id) else {
                // Stale: the identity completed or expired earlier.
                continue;
            };
            if batch.earliest_expiry() != expiry {
                // Stale: a duplicate from re-observing the identity.
                continue;
            }
            if !self.completer.is_expired(batch, now) {
                // The completer grants more time than the index key; keep the
                // entry and its index position.
                retained.push(Reverse((expiry, id)));
                continue;
            }
            let batch = self.entries.remove(&id).expect("entry must exist");
            trace!(batch = %id, expiry, "batch expired");
            expired.insert(id, batch);
        }
        self.index.extend(retained);
        self.collect(expired)
    }

    /// Returns all stored batches, sorted by identity.
    pub fn batches(&self) -> Vec<Batch<P, H>> {
        self.entries.values().cloned().collect()
    }

    /// Returns whether the state holds no batches.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of in-flight batches.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the state holds a batch with the given identity.
    pub fn contains(&self, id: &H::Digest) -> bool {
        self.entries.contains_key(id)
    }
}
