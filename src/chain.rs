//! Chain façade: head management, genesis, block insertion, proposing,
//! validation and the deterministic state transition.
//!
//! The engine is single-writer: the consensus collaborator serializes every
//! state-mutating call (`add_block`, `propose_block`, `initialize_chain`,
//! `write_final_consensus`). Reads of the head may run concurrently with the
//! writer; speculative work always goes through check snapshots, so
//! `propose_block` and `validate_proposed_block` are side-effect-free on the
//! live state.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use k256::ecdsa::SigningKey;
use malachite::Natural;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, trace};

use crate::config::{ChainConfig, Network};
use crate::crypto;
use crate::errors::{ChainError, ChainResult};
use crate::fees;
use crate::mempool::TxPool;
use crate::repository::Storage;
use crate::state::StateDB;
use crate::types::{
    derive_tx_root, natural_from_bytes, Address, Block, BlockCert, Body, Coins, EmptyHeader, Hash,
    Header, IdentityState, ProposedHeader, Seed, Transaction, TxType,
};
use crate::validation;
use crate::validators::ValidatorsCache;
use crate::vrf::{self, VrfSigner};

const PROPOSER_ROLE: u8 = 0x1;
const GENESIS_SEED_TAG: [u8; 6] = [0x1, 0x2, 0x3, 0x4, 0x5, 0x6];
const FINAL_COMMITTEE_SAMPLE_LIMIT: usize = 1000;

struct NodeKeys {
    public_bytes: Vec<u8>,
    coinbase: Address,
    vrf: VrfSigner,
}

pub struct Blockchain {
    config: ChainConfig,
    storage: Storage,
    txpool: Arc<dyn TxPool>,
    state: RwLock<StateDB>,
    validators: RwLock<ValidatorsCache>,
    head: RwLock<Option<Block>>,
    genesis: RwLock<Option<Block>>,
    keys: RwLock<Option<NodeKeys>>,
}

impl Blockchain {
    pub fn new(config: ChainConfig, storage: Storage, txpool: Arc<dyn TxPool>) -> ChainResult<Self> {
        let state = StateDB::open(storage.clone())?;
        let validators = ValidatorsCache::from_state(&state);
        Ok(Self {
            config,
            storage,
            txpool,
            state: RwLock::new(state),
            validators: RwLock::new(validators),
            head: RwLock::new(None),
            genesis: RwLock::new(None),
            keys: RwLock::new(None),
        })
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    /// Derives the node keys, restores the head from the repository or creates
    /// genesis on first start.
    pub fn initialize_chain(&self, secret_key: &SigningKey) -> ChainResult<()> {
        let public = secret_key.verifying_key();
        let public_bytes = crypto::pubkey_bytes(public);
        let coinbase = crypto::pubkey_to_address(public);
        let vrf = VrfSigner::from_entropy(secret_key.to_bytes().as_slice())?;
        *self.keys.write() = Some(NodeKeys {
            public_bytes,
            coinbase,
            vrf,
        });

        if let Some(head) = self.read_head_block()? {
            *self.head.write() = Some(head);
            let genesis = self
                .get_block_by_height(1)?
                .ok_or_else(|| ChainError::Config("genesis block is not found".into()))?;
            *self.genesis.write() = Some(genesis);
        } else {
            self.generate_genesis(self.config.network)?;
        }

        let head = self
            .get_head()
            .ok_or_else(|| ChainError::Config("head missing after initialization".into()))?;
        info!(block = %head.hash(), height = head.height(), "chain initialized");
        Ok(())
    }

    fn read_head_block(&self) -> ChainResult<Option<Block>> {
        match self.storage.read_head()? {
            Some(header) => self.storage.read_block(&header.hash()),
            None => Ok(None),
        }
    }

    pub fn get_head(&self) -> Option<Block> {
        self.head.read().clone()
    }

    pub fn round(&self) -> u64 {
        self.head
            .read()
            .as_ref()
            .map(|block| block.height() + 1)
            .unwrap_or_default()
    }

    pub fn genesis(&self) -> Option<Hash> {
        self.genesis.read().as_ref().map(Block::hash)
    }

    pub fn coinbase(&self) -> Option<Address> {
        self.keys.read().as_ref().map(|keys| keys.coinbase)
    }

    /// Commits the initial empty state and stores the height-1 block whose
    /// seed ties the chain to its network id.
    pub fn generate_genesis(&self, network: Network) -> ChainResult<Block> {
        let root = {
            let mut state = self.state.write();
            state.set_next_epoch_block(self.config.consensus.epoch_length);
            state.commit(true)?;
            state.root()
        };

        let mut seed_data = GENESIS_SEED_TAG.to_vec();
        seed_data.push(network.id());
        let block = Block {
            header: Header::Empty(EmptyHeader {
                parent_hash: Hash::default(),
                height: 1,
                state_root: root,
            }),
            body: Body {
                transactions: Vec::new(),
                block_seed: Seed::from(crypto::keccak256(&seed_data)),
                seed_proof: Vec::new(),
            },
        };
        self.insert_block(&block)?;
        *self.genesis.write() = Some(block.clone());
        Ok(block)
    }

    /// Reconstructs the block a round without a proposal settles on. The seed
    /// is a plain keccak of the seed data; empty blocks carry no proof.
    pub fn generate_empty_block(&self) -> ChainResult<Block> {
        let head = self
            .get_head()
            .ok_or_else(|| ChainError::Config("chain has no head".into()))?;
        let root = self.state.read().root();
        let mut block = Block {
            header: Header::Empty(EmptyHeader {
                parent_hash: head.hash(),
                height: head.height() + 1,
                state_root: root,
            }),
            body: Body {
                transactions: Vec::new(),
                block_seed: Seed::default(),
                seed_proof: Vec::new(),
            },
        };
        let seed_data = self.get_seed_data(&block)?;
        block.body.block_seed = Seed::from(crypto::keccak256(&seed_data));
        Ok(block)
    }

    /// Commits a block the consensus round settled on: validates, applies to
    /// the live state, persists, advances the head and resets the mempool.
    pub fn add_block(&self, block: &Block) -> ChainResult<()> {
        self.validate_block_parent_hash(block)?;
        if !block.is_empty() {
            self.validate_proposed_block(block)?;
        }
        self.apply_block(block)?;
        self.insert_block(block)?;
        Ok(())
    }

    fn apply_block(&self, block: &Block) -> ChainResult<()> {
        let mut state = self.state.write();
        if !block.is_empty() {
            let root = match self.execute_block_on(&mut state, block) {
                Ok(root) => root,
                Err(err) => {
                    state.reset();
                    return Err(err);
                }
            };
            if root != block.state_root() {
                state.reset();
                return Err(ChainError::InvalidStateRoot {
                    computed: root,
                    declared: block.state_root(),
                });
            }
        }
        self.apply_new_epoch(&mut state, block.height());
        let (root, version) = state.commit(true)?;
        trace!(root = %root, version, declared = %block.state_root(), "applied block");
        self.txpool.reset_to(block);
        self.validators
            .write()
            .refresh_if_updated(&state, &block.body.transactions);
        Ok(())
    }

    /// Runs the full state transition of a non-empty block (transactions in
    /// body order plus rewards) and returns the tentative root. Nothing is
    /// committed; the caller decides.
    pub fn execute_block_on(&self, state: &mut StateDB, block: &Block) -> ChainResult<Hash> {
        let total_fee = self.process_txs(state, block)?;
        Ok(self.apply_block_rewards(state, &total_fee, block))
    }

    fn process_txs(&self, state: &mut StateDB, block: &Block) -> ChainResult<Coins> {
        let network_size = self.validators.read().size();
        let mut total_fee = Coins::zero();
        for tx in &block.body.transactions {
            validation::validate_tx(state, network_size, tx)?;
            let fee = self.apply_tx_on_state(state, tx)?;
            total_fee.add_assign(&fee);
        }
        Ok(total_fee)
    }

    /// Applies one transaction to the state and returns its fee. Precondition
    /// failures leave the caller to roll back the whole block.
    pub fn apply_tx_on_state(&self, state: &mut StateDB, tx: &Transaction) -> ChainResult<Coins> {
        let sender = tx.sender()?;

        let global_epoch = state.epoch();
        if tx.epoch != global_epoch {
            return Err(ChainError::InvalidEpoch {
                expected: global_epoch,
                actual: tx.epoch,
            });
        }

        let account = state.account(&sender);
        // An epoch bump resets the per-account sequence to 1.
        let current_nonce = if account.epoch < global_epoch {
            0
        } else {
            account.nonce
        };
        if current_nonce + 1 != tx.account_nonce {
            return Err(ChainError::InvalidNonce {
                expected: current_nonce + 1,
                actual: tx.account_nonce,
            });
        }

        let network_size = self.validators.read().size();
        let fee = fees::calculate_fee(network_size, tx);
        let cost = fees::calculate_cost(network_size, tx);

        match tx.tx_type {
            TxType::Activation => {
                let recipient = require_destination(tx)?;
                let balance = state.balance(&sender);
                let change = balance.checked_sub(&cost).ok_or_else(|| {
                    ChainError::InvalidTransaction("insufficient balance to cover cost".into())
                })?;
                // The throwaway invite key is burned and its residual funds
                // move to the activated long-term identity.
                state.set_balance(&sender, Coins::zero());
                state.set_identity_state(&sender, IdentityState::Killed);
                state.set_identity_state(&recipient, IdentityState::Verified);
                state.add_balance(&recipient, &change);
            }
            TxType::Regular => {
                let recipient = require_destination(tx)?;
                state.sub_balance(&sender, &cost)?;
                state.add_balance(&recipient, &tx.amount_or_zero());
            }
            TxType::Invite => {
                let recipient = require_destination(tx)?;
                state.sub_invites(&sender, 1)?;
                state.sub_balance(&sender, &cost)?;
                state.set_identity_state(&recipient, IdentityState::Invite);
                let endowment = cost.checked_sub(&fee).ok_or_else(|| {
                    ChainError::InvalidTransaction("cost below fee".into())
                })?;
                state.add_balance(&recipient, &endowment);
            }
            TxType::Kill => {
                state.set_identity_state(&sender, IdentityState::Killed);
            }
            TxType::NewEpoch => {}
        }

        state.set_nonce(&sender, tx.account_nonce);
        if state.account(&sender).epoch != tx.epoch {
            state.set_account_epoch(&sender, tx.epoch);
        }
        Ok(fee)
    }

    /// Credits the coinbase with the block reward and the non-burned fees,
    /// pays the final committee, and returns the tentative root.
    fn apply_block_rewards(&self, state: &mut StateDB, total_fee: &Coins, block: &Block) -> Hash {
        let consensus = &self.config.consensus;

        let burn = fees::scale_by_rate(total_fee.as_natural(), consensus.fee_burn_rate);
        let fee_reward = total_fee.as_natural() - &burn;

        let stake_share = fees::scale_by_rate(
            consensus.block_reward.as_natural(),
            consensus.stake_reward_rate,
        );
        let balance_reward = consensus.block_reward.as_natural() - &stake_share;

        if let Some(coinbase) = block.header.coinbase() {
            state.add_balance(&coinbase, &Coins::from_natural(balance_reward + fee_reward));
            state.add_stake(&coinbase, &Coins::from_natural(stake_share));
            state.add_invites(&coinbase, 1);
        }

        self.reward_final_committee(state, block);
        state.precommit(true)
    }

    fn reward_final_committee(&self, state: &mut StateDB, block: &Block) {
        if block.is_empty() {
            return;
        }
        let Some(head) = self.get_head() else {
            return;
        };
        let committee = self.validators.read().get_actual_validators(
            head.seed(),
            head.height(),
            FINAL_COMMITTEE_SAMPLE_LIMIT,
            self.get_committee_size(true),
        );
        if committee.is_empty() {
            return;
        }
        let consensus = &self.config.consensus;
        let per_member = consensus.final_committee_reward.as_natural()
            / Natural::from(committee.len() as u64);
        let stake_share = fees::scale_by_rate(&per_member, consensus.stake_reward_rate);
        let reward = Coins::from_natural(&per_member - &stake_share);
        let stake = Coins::from_natural(stake_share);
        for address in committee {
            state.add_balance(&address, &reward);
            state.add_stake(&address, &stake);
        }
    }

    /// Promotes candidates and advances the global epoch when the height
    /// reaches the scheduled boundary. Repeated calls for the same height
    /// have no further effect.
    pub fn apply_new_epoch(&self, state: &mut StateDB, height: u64) {
        if height < state.next_epoch_block() {
            return;
        }
        let mut promoted = Vec::new();
        state.for_each_identity(|address, identity| {
            if identity.state == IdentityState::Candidate {
                promoted.push(*address);
            }
        });
        for address in promoted {
            state.set_identity_state(&address, IdentityState::Verified);
        }
        state.increment_epoch();
        let next = state.next_epoch_block() + self.config.consensus.epoch_length;
        state.set_next_epoch_block(next);
    }

    /// Builds a candidate block from the mempool on a check snapshot. Invalid
    /// candidates are filtered silently.
    pub fn propose_block(&self) -> ChainResult<Block> {
        let head = self
            .get_head()
            .ok_or_else(|| ChainError::Config("chain has no head".into()))?;
        let candidates = self.txpool.build_candidate_batch();
        let mut check_state = { self.state.read().new_for_check(head.height()) };
        let (filtered, total_fee) = self.filter_txs(&mut check_state, candidates);

        let keys = self.keys.read();
        let keys = keys
            .as_ref()
            .ok_or_else(|| ChainError::Config("chain keys are not initialized".into()))?;

        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ChainError::Config(format!("system clock before unix epoch: {err}")))?
            .as_secs();

        let tx_root = derive_tx_root(&filtered);
        let mut block = Block {
            header: Header::Proposed(ProposedHeader {
                parent_hash: head.hash(),
                height: head.height() + 1,
                time,
                proposer_pubkey: keys.public_bytes.clone(),
                tx_root,
                state_root: Hash::default(),
                coinbase: keys.coinbase,
            }),
            body: Body {
                transactions: filtered,
                block_seed: Seed::default(),
                seed_proof: Vec::new(),
            },
        };

        let root = self.apply_block_rewards(&mut check_state, &total_fee, &block);
        if let Header::Proposed(header) = &mut block.header {
            header.state_root = root;
        }

        let seed_data = self.get_seed_data(&block)?;
        let (randomness, proof) = keys.vrf.evaluate(&keys.public_bytes, &seed_data);
        block.body.block_seed = Seed::from(randomness);
        block.body.seed_proof = proof;
        Ok(block)
    }

    fn filter_txs(
        &self,
        state: &mut StateDB,
        candidates: Vec<Transaction>,
    ) -> (Vec<Transaction>, Coins) {
        let network_size = self.validators.read().size();
        let mut filtered = Vec::new();
        let mut total_fee = Coins::zero();
        for tx in candidates {
            if let Err(err) = validation::validate_tx(state, network_size, &tx) {
                trace!(error = %err, "dropping candidate transaction");
                continue;
            }
            match self.apply_tx_on_state(state, &tx) {
                Ok(fee) => {
                    total_fee.add_assign(&fee);
                    filtered.push(tx);
                }
                Err(err) => trace!(error = %err, "dropping candidate transaction"),
            }
        }
        (filtered, total_fee)
    }

    /// End-to-end validation of a peer proposal: parent linkage, VRF seed,
    /// proposer membership, transaction root, transactions and state root.
    pub fn validate_proposed_block(&self, block: &Block) -> ChainResult<()> {
        self.validate_block_parent_hash(block)?;
        let header = match &block.header {
            Header::Proposed(header) => header,
            Header::Empty(_) => {
                return Err(ChainError::InvalidProposer(
                    "block carries no proposal header".into(),
                ))
            }
        };

        if block.seed().is_zero() {
            return Err(ChainError::InvalidSeed("block seed is empty".into()));
        }
        let seed_data = self.get_seed_data(block)?;
        vrf::verify(
            &header.proposer_pubkey,
            &seed_data,
            &block.seed().to_hash(),
            &block.body.seed_proof,
        )?;

        let proposer = crypto::pubkey_bytes_to_address(&header.proposer_pubkey)?;
        {
            let validators = self.validators.read();
            if validators.size() > 0 && !validators.contains(&proposer) {
                return Err(ChainError::InvalidProposer(
                    "proposer is not a valid identity".into(),
                ));
            }
        }

        let tx_root = derive_tx_root(&block.body.transactions);
        if tx_root != header.tx_root {
            return Err(ChainError::InvalidTxRoot {
                computed: tx_root,
                declared: header.tx_root,
            });
        }

        for tx in &block.body.transactions {
            validation::validate_tx_stateless(tx)?;
        }

        let mut check_state = {
            self.state
                .read()
                .new_for_check(block.height().saturating_sub(1))
        };
        let root = self.execute_block_on(&mut check_state, block)?;
        if root != header.state_root {
            return Err(ChainError::InvalidStateRoot {
                computed: root,
                declared: header.state_root,
            });
        }
        Ok(())
    }

    /// Verifies a peer's eligibility proof for the current round.
    pub fn validate_proposer_proof(
        &self,
        proof: &[u8],
        randomness: &Hash,
        pubkey_bytes: &[u8],
    ) -> ChainResult<()> {
        let data = self.get_proposer_data()?;
        vrf::verify(pubkey_bytes, &data, randomness, proof)?;
        if !sortition_eligible(randomness, self.config.consensus.proposer_threshold) {
            return Err(ChainError::InvalidProposer(
                "sortition threshold not met".into(),
            ));
        }
        let proposer = crypto::pubkey_bytes_to_address(pubkey_bytes)?;
        let validators = self.validators.read();
        if validators.size() > 0 && !validators.contains(&proposer) {
            return Err(ChainError::InvalidProposer(
                "proposer is not a valid identity".into(),
            ));
        }
        Ok(())
    }

    fn validate_block_parent_hash(&self, block: &Block) -> ChainResult<()> {
        let head = self
            .get_head()
            .ok_or_else(|| ChainError::InvalidParent("chain has no head".into()))?;
        if head.height() + 1 != block.height() {
            return Err(ChainError::InvalidParent(format!(
                "height is invalid: expected {} received {}",
                head.height() + 1,
                block.height()
            )));
        }
        if head.hash() != block.parent_hash() {
            return Err(ChainError::InvalidParent(
                "parent hash does not match head".into(),
            ));
        }
        Ok(())
    }

    /// Persists the block and its indexes, then advances the in-memory head.
    /// Write order (block → canonical → head) keeps the durable head at most
    /// one entry behind its data after a crash.
    fn insert_block(&self, block: &Block) -> ChainResult<()> {
        self.storage.write_block(block)?;
        self.storage
            .write_canonical_hash(block.height(), &block.hash())?;
        self.storage.write_head(&block.header)?;
        *self.head.write() = Some(block.clone());
        Ok(())
    }

    /// Seed input of a block: parent seed, height and block hash.
    pub fn get_seed_data(&self, block: &Block) -> ChainResult<Vec<u8>> {
        let head = self
            .get_head()
            .ok_or_else(|| ChainError::Config("chain has no head".into()))?;
        let mut data = head.seed().as_bytes().to_vec();
        data.extend_from_slice(&block.height().to_be_bytes());
        data.extend_from_slice(block.hash().as_bytes());
        Ok(data)
    }

    /// Eligibility input of the next round: parent seed, proposer role tag
    /// and the round height.
    fn get_proposer_data(&self) -> ChainResult<Vec<u8>> {
        let head = self
            .get_head()
            .ok_or_else(|| ChainError::Config("chain has no head".into()))?;
        let mut data = head.seed().as_bytes().to_vec();
        data.push(PROPOSER_ROLE);
        data.extend_from_slice(&(head.height() + 1).to_be_bytes());
        Ok(data)
    }

    /// Local self-selection for the next round. Returns the VRF output and
    /// proof when the node clears the proposer threshold.
    pub fn get_proposer_sortition(&self) -> ChainResult<(bool, Hash, Vec<u8>)> {
        let data = self.get_proposer_data()?;
        let keys = self.keys.read();
        let keys = keys
            .as_ref()
            .ok_or_else(|| ChainError::Config("chain keys are not initialized".into()))?;
        let (randomness, proof) = keys.vrf.evaluate(&keys.public_bytes, &data);
        if sortition_eligible(&randomness, self.config.consensus.proposer_threshold) {
            Ok((true, randomness, proof))
        } else {
            Ok((false, Hash::default(), Vec::new()))
        }
    }

    pub fn get_block(&self, hash: &Hash) -> ChainResult<Option<Block>> {
        self.storage.read_block(hash)
    }

    pub fn get_block_by_height(&self, height: u64) -> ChainResult<Option<Block>> {
        match self.storage.read_canonical_hash(height)? {
            Some(hash) => self.storage.read_block(&hash),
            None => Ok(None),
        }
    }

    /// Hook for the external voting protocol once a block is finalized.
    pub fn write_final_consensus(&self, hash: &Hash, cert: &BlockCert) -> ChainResult<()> {
        self.storage.write_final_consensus(hash)?;
        self.storage.write_cert(hash, cert)
    }

    pub fn get_committee_size(&self, final_committee: bool) -> usize {
        let count = self.validators.read().size();
        let percent = if final_committee {
            self.config.consensus.final_committee_consensus_percent
        } else {
            self.config.consensus.committee_percent
        };
        if count <= 8 {
            return count;
        }
        (count as f64 * percent) as usize
    }

    pub fn get_committee_votes_threshold(&self, final_committee: bool) -> usize {
        let count = self.validators.read().size();
        let percent = if final_committee {
            self.config.consensus.final_committee_consensus_percent
        } else {
            self.config.consensus.committee_percent
        };
        match count {
            1 => 1,
            2 | 3 => 2,
            4 | 5 => 3,
            6 | 7 => 4,
            8 => 5,
            _ => (count as f64 * percent * self.config.consensus.threshold_ba) as usize,
        }
    }

    pub fn state(&self) -> RwLockReadGuard<'_, StateDB> {
        self.state.read()
    }

    pub fn state_mut(&self) -> RwLockWriteGuard<'_, StateDB> {
        self.state.write()
    }

    pub fn validators(&self) -> RwLockReadGuard<'_, ValidatorsCache> {
        self.validators.read()
    }

    pub fn validators_mut(&self) -> RwLockWriteGuard<'_, ValidatorsCache> {
        self.validators.write()
    }
}

fn require_destination(tx: &Transaction) -> ChainResult<Address> {
    tx.to
        .ok_or_else(|| ChainError::InvalidTransaction("destination address required".into()))
}

fn max_hash() -> Natural {
    natural_from_bytes(&[0xff; 32])
}

/// Integer form of the `v / MAX ≥ threshold` eligibility test: compares
/// `v * denom` against `round(threshold * denom) * MAX`.
pub fn sortition_eligible(randomness: &Hash, threshold: f64) -> bool {
    let value = natural_from_bytes(randomness.as_bytes());
    value * Natural::from(fees::RATE_DENOM) >= Natural::from(fees::rate_ppm(threshold)) * max_hash()
}
