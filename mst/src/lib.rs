//! Aggregate partial signatures on transaction batches until quorum.
//!
//! # Overview
//!
//! Signatories submit batches of transactions, each transaction carrying a
//! growing set of signatures and a quorum descriptor. Every node keeps its
//! pending batches in an [MstState]: a commutative, idempotent merge structure
//! keyed by a signature-independent batch identity. Nodes periodically
//! exchange their states and merge what they receive, adopting every signature
//! that verifies and is not yet known. A batch leaves the state either by
//! completing (every transaction reached its quorum) or by expiring (the local
//! clock passed its earliest deadline).
//!
//! # Details
//!
//! The [Engine] owns the state and is responsible for:
//! - Accepting batch submissions from local clients
//! - Periodically broadcasting the local state to peers
//! - Merging states received from peers
//! - Evicting expired batches
//!
//! The [Mailbox] is used to make requests to the [Engine]: submitting a batch
//! and snapshotting the pending state. Completions, expiries, and progress are
//! delivered to a [Reporter] in the order they are produced; completion and
//! expiry fire exactly once per batch within a state instance.
//!
//! Peer input is untrusted. Signatures that fail verification (or duplicate a
//! signatory already present) are dropped silently and counted, malformed
//! batches are rejected without mutating state, and every length-prefixed
//! collection decoded off the wire is bounded. Only caller-actionable errors (a malformed local submission, a
//! full state) surface as [types::Error].

use commonware_cryptography::{Hasher, PublicKey};
use std::future::Future;

mod config;
pub use config::Config;
mod engine;
pub use engine::Engine;
mod ingress;
pub use ingress::Mailbox;
mod metrics;
mod policy;
pub use policy::{MOfN, ThresholdWeighted};
mod state;
pub use state::{Insertion, Merge, MstState};
pub mod types;

#[cfg(test)]
pub mod mocks;

use types::{Batch, Timestamp};

/// Decides when a batch has gathered enough signatures, and when it has
/// expired.
///
/// Implementations must be deterministic and pure (same inputs, same outputs)
/// so that all peers observe the same completeness at the same signature
/// configuration.
pub trait Completer<P: PublicKey, H: Hasher>: Clone + Send + 'static {
    /// Returns `true` iff every transaction in the batch has gathered its
    /// quorum.
    fn is_complete(&self, batch: &Batch<P, H>) -> bool;

    /// Returns `true` iff the batch may be discarded at `now`.
    ///
    /// Must be consistent with [Batch::earliest_expiry], which keys the
    /// expiry index: a batch must never be expired before its earliest
    /// deadline.
    fn is_expired(&self, batch: &Batch<P, H>, now: Timestamp) -> bool {
        batch.earliest_expiry() <= now
    }
}

/// Reporter is the interface responsible for reporting activity to some
/// external actor.
pub trait Reporter: Clone + Send + 'static {
    /// The type of activity to report.
    type Activity;

    /// Report some activity that has occurred.
    fn report(&mut self, activity: Self::Activity) -> impl Future<Output = ()> + Send;
}
