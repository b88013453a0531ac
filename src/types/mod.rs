mod account;
mod block;
mod transaction;

pub use account::{Account, Coins, Global, Identity, IdentityState};
pub(crate) use account::natural_from_bytes;
pub use block::{
    compute_merkle_root, derive_tx_root, Block, BlockCert, Body, EmptyHeader, Header,
    ProposedHeader,
};
pub use transaction::{Transaction, TxType};

use std::fmt;

use crate::errors::{ChainError, ChainResult};

/// 32-byte Keccak-256 digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> ChainResult<Self> {
        let bytes: [u8; Self::LEN] = data
            .try_into()
            .map_err(|_| ChainError::Encoding(format!("hash must be {} bytes", Self::LEN)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

/// 32-byte block seed feeding committee selection and sortition.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Seed([u8; 32]);

impl Seed {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> ChainResult<Self> {
        let bytes: [u8; 32] = data
            .try_into()
            .map_err(|_| ChainError::Encoding("seed must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hash(&self) -> Hash {
        Hash(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<Hash> for Seed {
    fn from(hash: Hash) -> Self {
        Self(hash.0)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({self})")
    }
}

/// 20-byte account address: the low bytes of the keccak digest of the
/// uncompressed public key.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> ChainResult<Self> {
        let bytes: [u8; Self::LEN] = data
            .try_into()
            .map_err(|_| ChainError::Encoding(format!("address must be {} bytes", Self::LEN)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
