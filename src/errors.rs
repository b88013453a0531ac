use std::io;

use thiserror::Error;

use crate::types::Hash;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid parent: {0}")]
    InvalidParent(String),
    #[error("transaction rejected: {0}")]
    InvalidTransaction(String),
    #[error("invalid tx nonce: expected={expected} actual={actual}")]
    InvalidNonce { expected: u32, actual: u32 },
    #[error("invalid tx epoch: expected={expected} actual={actual}")]
    InvalidEpoch { expected: u16, actual: u16 },
    #[error("invalid state root: computed={computed} declared={declared}")]
    InvalidStateRoot { computed: Hash, declared: Hash },
    #[error("invalid tx root: computed={computed} declared={declared}")]
    InvalidTxRoot { computed: Hash, declared: Hash },
    #[error("invalid block seed: {0}")]
    InvalidSeed(String),
    #[error("invalid proposer: {0}")]
    InvalidProposer(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("cryptography error: {0}")]
    Crypto(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ChainError {
    /// Stable code identifying the error kind toward the consensus layer.
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::InvalidParent(_) => "INVALID_PARENT",
            ChainError::InvalidTransaction(_) => "INVALID_TRANSACTION",
            ChainError::InvalidNonce { .. } => "INVALID_NONCE",
            ChainError::InvalidEpoch { .. } => "INVALID_EPOCH",
            ChainError::InvalidStateRoot { .. } => "INVALID_STATE_ROOT",
            ChainError::InvalidTxRoot { .. } => "INVALID_TX_ROOT",
            ChainError::InvalidSeed(_) => "INVALID_SEED",
            ChainError::InvalidProposer(_) => "INVALID_PROPOSER",
            ChainError::Encoding(_) => "ENCODING",
            ChainError::Crypto(_) => "CRYPTO",
            ChainError::Config(_) => "CONFIG",
            ChainError::Storage(_) | ChainError::Io(_) => "INTERNAL_IO",
        }
    }

    /// Only repository and state-store failures are fatal to the engine.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::Storage(_) | ChainError::Io(_))
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
