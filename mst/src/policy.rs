//! Completion policies deciding when a batch has gathered enough signatures.

use crate::{types::Batch, Completer};
use commonware_cryptography::{Hasher, PublicKey};
use std::collections::BTreeMap;

/// Completes a transaction once it holds signatures from `quorum` distinct
/// signatories (M-of-N multisig).
#[derive(Clone, Copy, Debug, Default)]
pub struct MOfN;

impl<P: PublicKey, H: Hasher> Completer<P, H> for MOfN {
    fn is_complete(&self, batch: &Batch<P, H>) -> bool {
        batch
            .transactions
            .iter()
            .all(|tx| tx.signatures.len() >= tx.quorum as usize)
    }
}

/// Completes a transaction once the weights of its signatories sum to the
/// transaction's quorum descriptor. Signatories without an assigned weight
/// contribute nothing.
#[derive(Clone, Debug)]
pub struct ThresholdWeighted<P: PublicKey> {
    weights: BTreeMap<P, u32>,
}

impl<P: PublicKey> ThresholdWeighted<P> {
    /// Creates a policy from the given signatory weights.
    pub fn new(weights: BTreeMap<P, u32>) -> Self {
        Self { weights }
    }
}

impl<P: PublicKey, H: Hasher> Completer<P, H> for ThresholdWeighted<P> {
    fn is_complete(&self, batch: &Batch<P, H>) -> bool {
        batch.transactions.iter().all(|tx| {
            let weight: u64 = tx
                .signatures
                .keys()
                .map(|signatory| u64::from(self.weights.get(signatory).copied().unwrap_or(0)))
                .sum();
            weight >= u64::from(tx.quorum)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transaction;
    use bytes::Bytes;
    use commonware_cryptography::{
        ed25519::{PrivateKey, PublicKey},
        PrivateKeyExt, Sha256, Signer,
    };

    const NAMESPACE: &[u8] = b"test";

    fn batch(quorum: u32, seeds: &[u64]) -> Batch<PublicKey, Sha256> {
        let mut tx = Transaction::new(Bytes::from_static(b"transfer"), quorum, 100);
        for seed in seeds {
            tx.sign(&PrivateKey::from_seed(*seed), NAMESPACE);
        }
        Batch::new(vec![tx])
    }

    #[test]
    fn test_m_of_n() {
        assert!(!Completer::<PublicKey, Sha256>::is_complete(&MOfN, &batch(2, &[0])));
        assert!(Completer::<PublicKey, Sha256>::is_complete(&MOfN, &batch(2, &[0, 1])));
        assert!(Completer::<PublicKey, Sha256>::is_complete(&MOfN, &batch(2, &[0, 1, 2])));
    }

    #[test]
    fn test_m_of_n_all_transactions() {
        let complete = batch(1, &[0]);
        let mut incomplete = batch(2, &[0]);
        let mut transactions = complete.transactions;
        transactions.append(&mut incomplete.transactions);
        let batch = Batch::new(transactions);
        assert!(!Completer::<PublicKey, Sha256>::is_complete(&MOfN, &batch));
    }

    #[test]
    fn test_threshold_weighted() {
        let weights = BTreeMap::from([
            (PrivateKey::from_seed(0).public_key(), 3),
            (PrivateKey::from_seed(1).public_key(), 1),
        ]);
        let policy = ThresholdWeighted::new(weights);

        // Seed 1 alone is below the threshold; seed 0 alone meets it.
        assert!(!Completer::<_, Sha256>::is_complete(&policy, &batch(3, &[1])));
        assert!(Completer::<_, Sha256>::is_complete(&policy, &batch(3, &[0])));
        assert!(Completer::<_, Sha256>::is_complete(&policy, &batch(4, &[0, 1])));

        // An unknown signatory weighs nothing.
        assert!(!Completer::<_, Sha256>::is_complete(&policy, &batch(1, &[7])));
    }

    #[test]
    fn test_expiry_boundary() {
        let batch = batch(1, &[0]);
        assert!(!Completer::<PublicKey, Sha256>::is_expired(&MOfN, &batch, 99));
        assert!(Completer::<PublicKey, Sha256>::is_expired(&MOfN, &batch, 100));
        assert!(Completer::<PublicKey, Sha256>::is_expired(&MOfN, &batch, 101));
    }
}
