use std::fmt;
use std::str::FromStr;

use malachite::base::num::arithmetic::traits::DivRem;
use malachite::base::num::conversion::traits::ExactFrom;
use malachite::Natural;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{ChainError, ChainResult};
use crate::rlp;

pub(crate) fn natural_from_bytes(bytes: &[u8]) -> Natural {
    let mut value = Natural::from(0u32);
    for byte in bytes {
        value *= Natural::from(256u32);
        value += Natural::from(*byte);
    }
    value
}

pub(crate) fn natural_to_bytes(value: &Natural) -> Vec<u8> {
    let mut digits = Vec::new();
    let mut rest = value.clone();
    let base = Natural::from(256u32);
    while rest != Natural::from(0u32) {
        let (quotient, remainder) = rest.div_rem(&base);
        digits.push(u8::exact_from(&remainder));
        rest = quotient;
    }
    digits.reverse();
    digits
}

/// Non-negative coin amount backed by an arbitrary-precision natural.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Coins {
    inner: Natural,
}

impl Coins {
    pub fn zero() -> Self {
        Self {
            inner: Natural::from(0u32),
        }
    }

    pub fn from_natural(inner: Natural) -> Self {
        Self { inner }
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            inner: Natural::from(value),
        }
    }

    pub fn from_u128(value: u128) -> Self {
        Self {
            inner: Natural::from(value),
        }
    }

    pub fn as_natural(&self) -> &Natural {
        &self.inner
    }

    pub fn is_zero(&self) -> bool {
        self.inner == Natural::from(0u32)
    }

    pub fn add_assign(&mut self, other: &Coins) {
        self.inner += other.inner.clone();
    }

    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        if self.inner >= other.inner {
            Some(Coins::from_natural(&self.inner - &other.inner))
        } else {
            None
        }
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        natural_to_bytes(&self.inner)
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self {
            inner: natural_from_bytes(bytes),
        }
    }
}

impl Default for Coins {
    fn default() -> Self {
        Self::zero()
    }
}

impl FromStr for Coins {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Natural::from_str(s).map(Coins::from_natural)
    }
}

impl Serialize for Coins {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.inner.to_string())
    }
}

impl<'de> Deserialize<'de> for Coins {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Natural::from_str(&value)
            .map(Coins::from_natural)
            .map_err(|_| serde::de::Error::custom("invalid coin amount"))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// Spendable balance and replay protection for one address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: Coins,
    pub nonce: u32,
    pub epoch: u16,
}

impl Account {
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.epoch == 0
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        let mut payload = rlp::encode_bytes(&self.balance.to_be_bytes());
        payload.extend_from_slice(&rlp::encode_uint(u64::from(self.nonce)));
        payload.extend_from_slice(&rlp::encode_uint(u64::from(self.epoch)));
        rlp::encode_list(&payload)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        let item = rlp::decode(data)?;
        let fields = item.list()?;
        if fields.len() != 3 {
            return Err(ChainError::Encoding("account must have 3 fields".into()));
        }
        Ok(Self {
            balance: Coins::from_be_bytes(fields[0].bytes()?),
            nonce: u32::try_from(fields[1].uint()?)
                .map_err(|_| ChainError::Encoding("account nonce out of range".into()))?,
            epoch: u16::try_from(fields[2].uint()?)
                .map_err(|_| ChainError::Encoding("account epoch out of range".into()))?,
        })
    }
}

/// Promotion lattice of an identity. `Killed` is absorbing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentityState {
    #[default]
    Undefined,
    Invite,
    Candidate,
    Verified,
    Killed,
}

impl IdentityState {
    pub fn as_u8(self) -> u8 {
        match self {
            IdentityState::Undefined => 0,
            IdentityState::Invite => 1,
            IdentityState::Candidate => 2,
            IdentityState::Verified => 3,
            IdentityState::Killed => 4,
        }
    }

    pub fn from_u8(value: u8) -> ChainResult<Self> {
        match value {
            0 => Ok(IdentityState::Undefined),
            1 => Ok(IdentityState::Invite),
            2 => Ok(IdentityState::Candidate),
            3 => Ok(IdentityState::Verified),
            4 => Ok(IdentityState::Killed),
            other => Err(ChainError::Encoding(format!(
                "unknown identity state {other}"
            ))),
        }
    }
}

/// Identity record: lattice state, non-withdrawable stake and invite quota.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub state: IdentityState,
    pub stake: Coins,
    pub invites: u8,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.state == IdentityState::Undefined && self.stake.is_zero() && self.invites == 0
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        let mut payload = rlp::encode_uint(u64::from(self.state.as_u8()));
        payload.extend_from_slice(&rlp::encode_bytes(&self.stake.to_be_bytes()));
        payload.extend_from_slice(&rlp::encode_uint(u64::from(self.invites)));
        rlp::encode_list(&payload)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        let item = rlp::decode(data)?;
        let fields = item.list()?;
        if fields.len() != 3 {
            return Err(ChainError::Encoding("identity must have 3 fields".into()));
        }
        Ok(Self {
            state: IdentityState::from_u8(
                u8::try_from(fields[0].uint()?)
                    .map_err(|_| ChainError::Encoding("identity state out of range".into()))?,
            )?,
            stake: Coins::from_be_bytes(fields[1].bytes()?),
            invites: u8::try_from(fields[2].uint()?)
                .map_err(|_| ChainError::Encoding("identity invites out of range".into()))?,
        })
    }
}

/// Chain-wide epoch counter and the next scheduled epoch boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Global {
    pub epoch: u16,
    pub next_epoch_block: u64,
}

impl Global {
    pub fn to_rlp(&self) -> Vec<u8> {
        let mut payload = rlp::encode_uint(u64::from(self.epoch));
        payload.extend_from_slice(&rlp::encode_uint(self.next_epoch_block));
        rlp::encode_list(&payload)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        let item = rlp::decode(data)?;
        let fields = item.list()?;
        if fields.len() != 2 {
            return Err(ChainError::Encoding("global state must have 2 fields".into()));
        }
        Ok(Self {
            epoch: u16::try_from(fields[0].uint()?)
                .map_err(|_| ChainError::Encoding("global epoch out of range".into()))?,
            next_epoch_block: fields[1].uint()?,
        })
    }
}
