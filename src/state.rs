//! Versioned account/identity state with speculative snapshots.
//!
//! Mutations accumulate in an explicit delta overlay above the committed
//! maps. `commit` folds the overlay in (persisting through the repository
//! when the state is the live one), `reset` discards it, and `new_for_check`
//! produces a memory-only snapshot whose commits never touch disk — the
//! proposer and validator run entire speculative blocks on such snapshots.

use std::collections::BTreeMap;

use crate::crypto::keccak256;
use crate::errors::{ChainError, ChainResult};
use crate::repository::Storage;
use crate::rlp;
use crate::types::{Account, Address, Coins, Global, Hash, Identity, IdentityState};

const ACCOUNT_PREFIX: u8 = 0x61;
const IDENTITY_PREFIX: u8 = 0x69;
const GLOBAL_PREFIX: u8 = 0x67;

#[derive(Clone, Debug, Default)]
struct StateObjects {
    accounts: BTreeMap<Address, Account>,
    identities: BTreeMap<Address, Identity>,
    global: Global,
}

#[derive(Clone, Debug, Default)]
struct StateDelta {
    accounts: BTreeMap<Address, Account>,
    identities: BTreeMap<Address, Identity>,
    global: Option<Global>,
}

impl StateDelta {
    fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.identities.is_empty() && self.global.is_none()
    }
}

pub struct StateDB {
    persist: Option<Storage>,
    committed: StateObjects,
    pending: StateDelta,
    version: u64,
    height: u64,
}

impl StateDB {
    /// Opens the live state, reloading committed objects from the repository.
    pub fn open(storage: Storage) -> ChainResult<Self> {
        let committed = StateObjects {
            accounts: storage.load_accounts()?,
            identities: storage.load_identities()?,
            global: storage.read_global()?.unwrap_or_default(),
        };
        let version = storage.read_state_version()?.unwrap_or(0);
        Ok(Self {
            persist: Some(storage),
            committed,
            pending: StateDelta::default(),
            version,
            height: 0,
        })
    }

    /// Memory-only state; used by tests and snapshot construction.
    pub fn in_memory() -> Self {
        Self {
            persist: None,
            committed: StateObjects::default(),
            pending: StateDelta::default(),
            version: 0,
            height: 0,
        }
    }

    /// Speculative snapshot over the committed objects. Commits stay in
    /// memory, so callers may abandon the snapshot without recovery actions.
    pub fn new_for_check(&self, height: u64) -> StateDB {
        StateDB {
            persist: None,
            committed: self.committed.clone(),
            pending: StateDelta::default(),
            version: self.version,
            height,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Merged view of one account; defaults for unknown addresses.
    pub fn account(&self, address: &Address) -> Account {
        self.pending
            .accounts
            .get(address)
            .or_else(|| self.committed.accounts.get(address))
            .cloned()
            .unwrap_or_default()
    }

    fn account_mut(&mut self, address: &Address) -> &mut Account {
        let committed = &self.committed.accounts;
        self.pending
            .accounts
            .entry(*address)
            .or_insert_with(|| committed.get(address).cloned().unwrap_or_default())
    }

    pub fn balance(&self, address: &Address) -> Coins {
        self.account(address).balance
    }

    pub fn add_balance(&mut self, address: &Address, amount: &Coins) {
        self.account_mut(address).balance.add_assign(amount);
    }

    pub fn sub_balance(&mut self, address: &Address, amount: &Coins) -> ChainResult<()> {
        let account = self.account_mut(address);
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| ChainError::InvalidTransaction("insufficient balance".into()))?;
        Ok(())
    }

    pub fn set_balance(&mut self, address: &Address, amount: Coins) {
        self.account_mut(address).balance = amount;
    }

    pub fn set_nonce(&mut self, address: &Address, nonce: u32) {
        self.account_mut(address).nonce = nonce;
    }

    pub fn set_account_epoch(&mut self, address: &Address, epoch: u16) {
        self.account_mut(address).epoch = epoch;
    }

    /// Merged view of one identity; defaults for unknown addresses.
    pub fn identity(&self, address: &Address) -> Identity {
        self.pending
            .identities
            .get(address)
            .or_else(|| self.committed.identities.get(address))
            .cloned()
            .unwrap_or_default()
    }

    fn identity_mut(&mut self, address: &Address) -> &mut Identity {
        let committed = &self.committed.identities;
        self.pending
            .identities
            .entry(*address)
            .or_insert_with(|| committed.get(address).cloned().unwrap_or_default())
    }

    pub fn set_identity_state(&mut self, address: &Address, state: IdentityState) {
        self.identity_mut(address).state = state;
    }

    pub fn add_stake(&mut self, address: &Address, amount: &Coins) {
        self.identity_mut(address).stake.add_assign(amount);
    }

    pub fn add_invites(&mut self, address: &Address, count: u8) {
        let identity = self.identity_mut(address);
        identity.invites = identity.invites.saturating_add(count);
    }

    pub fn sub_invites(&mut self, address: &Address, count: u8) -> ChainResult<()> {
        let identity = self.identity_mut(address);
        identity.invites = identity
            .invites
            .checked_sub(count)
            .ok_or_else(|| ChainError::InvalidTransaction("no invites left".into()))?;
        Ok(())
    }

    /// Visits every identity in the merged view, in address order.
    pub fn for_each_identity<F>(&self, mut visit: F)
    where
        F: FnMut(&Address, &Identity),
    {
        let mut seen: BTreeMap<&Address, &Identity> = BTreeMap::new();
        for (address, identity) in &self.committed.identities {
            seen.insert(address, identity);
        }
        for (address, identity) in &self.pending.identities {
            seen.insert(address, identity);
        }
        for (address, identity) in seen {
            visit(address, identity);
        }
    }

    pub fn global(&self) -> Global {
        self.pending
            .global
            .clone()
            .unwrap_or_else(|| self.committed.global.clone())
    }

    fn global_mut(&mut self) -> &mut Global {
        let committed = &self.committed.global;
        self.pending
            .global
            .get_or_insert_with(|| committed.clone())
    }

    pub fn epoch(&self) -> u16 {
        self.global().epoch
    }

    pub fn next_epoch_block(&self) -> u64 {
        self.global().next_epoch_block
    }

    pub fn increment_epoch(&mut self) {
        self.global_mut().epoch += 1;
    }

    pub fn set_next_epoch_block(&mut self, height: u64) {
        self.global_mut().next_epoch_block = height;
    }

    /// Discards all uncommitted mutations.
    pub fn reset(&mut self) {
        self.pending = StateDelta::default();
    }

    /// Tentative root over the merged view, without finalizing anything.
    pub fn precommit(&self, delete_empty_objects: bool) -> Hash {
        state_root(&self.merged(delete_empty_objects))
    }

    /// Root of the committed objects.
    pub fn root(&self) -> Hash {
        state_root(&self.committed)
    }

    /// Folds the pending delta into the committed maps, persists dirty
    /// objects through the repository when this is the live state, and bumps
    /// the version.
    pub fn commit(&mut self, delete_empty_objects: bool) -> ChainResult<(Hash, u64)> {
        let folded = self.merged(delete_empty_objects);
        if let Some(storage) = &self.persist {
            for address in self.pending.accounts.keys() {
                match folded.accounts.get(address) {
                    Some(account) => storage.put_account(address, account)?,
                    None => storage.delete_account(address)?,
                }
            }
            for address in self.pending.identities.keys() {
                match folded.identities.get(address) {
                    Some(identity) => storage.put_identity(address, identity)?,
                    None => storage.delete_identity(address)?,
                }
            }
            if self.pending.global.is_some() {
                storage.write_global(&folded.global)?;
            }
            storage.write_state_version(self.version + 1)?;
        }
        self.committed = folded;
        self.pending = StateDelta::default();
        self.version += 1;
        Ok((state_root(&self.committed), self.version))
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Folded view; the empty-object rule applies only to dirty entries so a
    /// reload from disk reproduces the same root.
    fn merged(&self, delete_empty_objects: bool) -> StateObjects {
        let mut objects = self.committed.clone();
        for (address, account) in &self.pending.accounts {
            objects.accounts.insert(*address, account.clone());
        }
        for (address, identity) in &self.pending.identities {
            objects.identities.insert(*address, identity.clone());
        }
        if let Some(global) = &self.pending.global {
            objects.global = global.clone();
        }
        if delete_empty_objects {
            for address in self.pending.accounts.keys() {
                if objects
                    .accounts
                    .get(address)
                    .is_some_and(|account| account.is_empty())
                {
                    objects.accounts.remove(address);
                }
            }
            for address in self.pending.identities.keys() {
                if objects
                    .identities
                    .get(address)
                    .is_some_and(|identity| identity.is_empty())
                {
                    objects.identities.remove(address);
                }
            }
        }
        objects
    }
}

/// Deterministic Merkle commitment over all state objects: keccak leaves of
/// the key-prefixed wire encoding, sorted by key, pairwise folded.
fn state_root(objects: &StateObjects) -> Hash {
    let mut leaves = Vec::with_capacity(objects.accounts.len() + objects.identities.len() + 1);
    for (address, account) in &objects.accounts {
        leaves.push(object_leaf(ACCOUNT_PREFIX, address.as_bytes(), &account.to_rlp()));
    }
    for (address, identity) in &objects.identities {
        leaves.push(object_leaf(IDENTITY_PREFIX, address.as_bytes(), &identity.to_rlp()));
    }
    leaves.push(object_leaf(GLOBAL_PREFIX, &[], &objects.global.to_rlp()));
    crate::types::compute_merkle_root(&mut leaves)
}

fn object_leaf(prefix: u8, key: &[u8], encoded: &[u8]) -> Hash {
    let mut prefixed_key = Vec::with_capacity(1 + key.len());
    prefixed_key.push(prefix);
    prefixed_key.extend_from_slice(key);
    let mut payload = rlp::encode_bytes(&prefixed_key);
    payload.extend_from_slice(&rlp::encode_bytes(encoded));
    keccak256(&rlp::encode_list(&payload))
}
