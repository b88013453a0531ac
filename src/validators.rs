//! Snapshot of currently-valid identities and deterministic committee
//! selection.

use std::collections::BTreeSet;

use crate::crypto::keccak256;
use crate::state::StateDB;
use crate::types::{Address, Hash, IdentityState, Seed, Transaction, TxType};

#[derive(Clone, Debug, Default)]
pub struct ValidatorsCache {
    valid: BTreeSet<Address>,
}

impl ValidatorsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: &StateDB) -> Self {
        let mut cache = Self::new();
        cache.rebuild(state);
        cache
    }

    /// Rescans the state for identities in the `Verified` lattice state.
    pub fn rebuild(&mut self, state: &StateDB) {
        let mut valid = BTreeSet::new();
        state.for_each_identity(|address, identity| {
            if identity.state == IdentityState::Verified {
                valid.insert(*address);
            }
        });
        self.valid = valid;
    }

    pub fn size(&self) -> usize {
        self.valid.len()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.valid.contains(address)
    }

    /// Deterministic committee drawn with the block seed: candidates are
    /// ranked by `keccak(seed ‖ height ‖ address)` and the lowest digests win.
    /// Identical on every node for identical inputs.
    pub fn get_actual_validators(
        &self,
        seed: &Seed,
        height: u64,
        limit: usize,
        committee_size: usize,
    ) -> Vec<Address> {
        if committee_size == 0 || self.valid.is_empty() {
            return Vec::new();
        }
        let mut ranked: Vec<(Hash, Address)> = self
            .valid
            .iter()
            .map(|address| {
                let mut data = Vec::with_capacity(Hash::LEN + 8 + Address::LEN);
                data.extend_from_slice(seed.as_bytes());
                data.extend_from_slice(&height.to_be_bytes());
                data.extend_from_slice(address.as_bytes());
                (keccak256(&data), *address)
            })
            .collect();
        ranked.sort();
        ranked
            .into_iter()
            .take(committee_size.min(limit))
            .map(|(_, address)| address)
            .collect()
    }

    /// Invalidates the cache when the batch contains a transaction that may
    /// have altered identity states.
    pub fn refresh_if_updated(&mut self, state: &StateDB, transactions: &[Transaction]) {
        let updated = transactions.iter().any(|tx| {
            matches!(
                tx.tx_type,
                TxType::Activation | TxType::Invite | TxType::Kill
            )
        });
        if updated {
            self.rebuild(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coins;

    fn addr(tag: u8) -> Address {
        Address::new([tag; 20])
    }

    fn state_with_verified(tags: &[u8]) -> StateDB {
        let mut state = StateDB::in_memory();
        for tag in tags {
            state.set_identity_state(&addr(*tag), IdentityState::Verified);
        }
        state.commit(true).expect("commit");
        state
    }

    #[test]
    fn counts_only_verified_identities() {
        let mut state = state_with_verified(&[1, 2]);
        state.set_identity_state(&addr(3), IdentityState::Candidate);
        state.set_identity_state(&addr(4), IdentityState::Killed);
        state.commit(true).expect("commit");

        let cache = ValidatorsCache::from_state(&state);
        assert_eq!(cache.size(), 2);
        assert!(cache.contains(&addr(1)));
        assert!(!cache.contains(&addr(3)));
    }

    #[test]
    fn committee_selection_is_deterministic() {
        let state = state_with_verified(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let cache = ValidatorsCache::from_state(&state);
        let seed = Seed::new([0x5a; 32]);

        let first = cache.get_actual_validators(&seed, 10, 1000, 4);
        let second = cache.get_actual_validators(&seed, 10, 1000, 4);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);

        let other_seed = cache.get_actual_validators(&Seed::new([0x5b; 32]), 10, 1000, 4);
        assert_ne!(first, other_seed);
    }

    #[test]
    fn committee_honors_limit_and_empty_set() {
        let state = state_with_verified(&[1, 2, 3]);
        let cache = ValidatorsCache::from_state(&state);
        let seed = Seed::new([0x01; 32]);

        assert_eq!(cache.get_actual_validators(&seed, 1, 2, 5).len(), 2);
        assert!(cache.get_actual_validators(&seed, 1, 1000, 0).is_empty());
        assert!(ValidatorsCache::new()
            .get_actual_validators(&seed, 1, 1000, 3)
            .is_empty());
    }

    #[test]
    fn refreshes_only_on_identity_transactions() {
        let mut state = state_with_verified(&[1]);
        let mut cache = ValidatorsCache::from_state(&state);
        assert_eq!(cache.size(), 1);

        state.set_identity_state(&addr(2), IdentityState::Verified);
        state.commit(true).expect("commit");

        let transfer = Transaction::new(TxType::Regular, 0, 1, Some(addr(9)), Coins::from_u64(1));
        cache.refresh_if_updated(&state, &[transfer.clone()]);
        assert_eq!(cache.size(), 1);

        let kill = Transaction::new(TxType::Kill, 0, 1, None, Coins::zero());
        cache.refresh_if_updated(&state, &[transfer, kill]);
        assert_eq!(cache.size(), 2);
    }
}
