//! Mempool contract consumed by the engine, plus a minimal in-memory pool.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::errors::{ChainError, ChainResult};
use crate::types::{Block, Hash, Transaction};

/// Interface the engine consumes from the transaction pool.
pub trait TxPool: Send + Sync {
    /// Candidate transactions for the next proposal, in pool order.
    fn build_candidate_batch(&self) -> Vec<Transaction>;

    /// Drops transactions included in the committed block.
    fn reset_to(&self, block: &Block);
}

/// Bounded in-memory pool used by tests and single-node setups.
pub struct InMemoryTxPool {
    capacity: usize,
    pending: RwLock<Vec<Transaction>>,
}

impl InMemoryTxPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, tx: Transaction) -> ChainResult<()> {
        let mut pending = self.pending.write();
        if pending.len() >= self.capacity {
            return Err(ChainError::InvalidTransaction("mempool full".into()));
        }
        let hash = tx.hash();
        if pending.iter().any(|existing| existing.hash() == hash) {
            return Err(ChainError::InvalidTransaction(
                "transaction already queued".into(),
            ));
        }
        pending.push(tx);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }
}

impl TxPool for InMemoryTxPool {
    fn build_candidate_batch(&self) -> Vec<Transaction> {
        self.pending.read().clone()
    }

    fn reset_to(&self, block: &Block) {
        let included: HashSet<Hash> = block
            .body
            .transactions
            .iter()
            .map(Transaction::hash)
            .collect();
        self.pending
            .write()
            .retain(|tx| !included.contains(&tx.hash()));
    }
}
