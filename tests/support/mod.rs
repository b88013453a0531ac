#![allow(dead_code)]

use std::sync::Arc;

use dna_chain::chain::Blockchain;
use dna_chain::config::ChainConfig;
use dna_chain::crypto::{keypair_from_seed, pubkey_to_address};
use dna_chain::mempool::InMemoryTxPool;
use dna_chain::repository::Storage;
use dna_chain::types::{Address, Coins, IdentityState};
use k256::ecdsa::SigningKey;
use tempfile::TempDir;

pub struct TestChain {
    pub chain: Blockchain,
    pub pool: Arc<InMemoryTxPool>,
    pub storage: Storage,
}

pub fn open_chain(dir: &TempDir, config: ChainConfig) -> TestChain {
    let storage = Storage::open(dir.path()).expect("open storage");
    let pool = Arc::new(InMemoryTxPool::new(1_024));
    let chain =
        Blockchain::new(config, storage.clone(), pool.clone()).expect("construct blockchain");
    TestChain {
        chain,
        pool,
        storage,
    }
}

pub fn node_key(tag: u8) -> SigningKey {
    keypair_from_seed(&[tag; 32]).expect("deterministic key")
}

pub fn address_of(key: &SigningKey) -> Address {
    pubkey_to_address(key.verifying_key())
}

/// Marks `count` synthetic addresses as verified identities and rebuilds the
/// validators cache. Extra addresses can be promoted alongside (typically the
/// node's own coinbase so its proposals pass the membership check).
pub fn seed_verified_identities(chain: &Blockchain, count: u8, extra: &[Address]) -> Vec<Address> {
    let mut seeded = Vec::new();
    {
        let mut state = chain.state_mut();
        for tag in 0..count {
            let address = Address::new([0xA0u8.wrapping_add(tag); 20]);
            state.set_identity_state(&address, IdentityState::Verified);
            seeded.push(address);
        }
        for address in extra {
            state.set_identity_state(address, IdentityState::Verified);
        }
        state.commit(true).expect("commit identities");
    }
    let state = chain.state();
    chain.validators_mut().rebuild(&state);
    seeded
}

pub fn fund(chain: &Blockchain, address: &Address, amount: Coins) {
    let mut state = chain.state_mut();
    state.add_balance(address, &amount);
    state.commit(true).expect("commit funding");
}

pub fn coins(value: &str) -> Coins {
    value.parse().expect("coin literal")
}
