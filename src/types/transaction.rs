use k256::ecdsa::SigningKey;

use crate::crypto;
use crate::errors::{ChainError, ChainResult};
use crate::rlp;
use crate::types::{Address, Coins, Hash};

/// Enumerated transaction kinds executed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxType {
    Regular,
    Activation,
    Invite,
    Kill,
    NewEpoch,
}

impl TxType {
    pub fn as_u8(self) -> u8 {
        match self {
            TxType::Regular => 0,
            TxType::Activation => 1,
            TxType::Invite => 2,
            TxType::Kill => 3,
            TxType::NewEpoch => 4,
        }
    }

    pub fn from_u8(value: u8) -> ChainResult<Self> {
        match value {
            0 => Ok(TxType::Regular),
            1 => Ok(TxType::Activation),
            2 => Ok(TxType::Invite),
            3 => Ok(TxType::Kill),
            4 => Ok(TxType::NewEpoch),
            other => Err(ChainError::Encoding(format!(
                "unknown transaction type {other}"
            ))),
        }
    }
}

/// Signed transfer of value or identity status. The sender is recovered from
/// the signature over the canonical encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub tx_type: TxType,
    pub epoch: u16,
    pub account_nonce: u32,
    pub to: Option<Address>,
    pub amount: Coins,
    pub signature: Vec<u8>,
}

impl Transaction {
    pub fn new(
        tx_type: TxType,
        epoch: u16,
        account_nonce: u32,
        to: Option<Address>,
        amount: Coins,
    ) -> Self {
        Self {
            tx_type,
            epoch,
            account_nonce,
            to,
            amount,
            signature: Vec::new(),
        }
    }

    pub fn amount_or_zero(&self) -> Coins {
        self.amount.clone()
    }

    fn unsigned_payload(&self) -> Vec<u8> {
        let mut payload = rlp::encode_uint(u64::from(self.tx_type.as_u8()));
        payload.extend_from_slice(&rlp::encode_uint(u64::from(self.epoch)));
        payload.extend_from_slice(&rlp::encode_uint(u64::from(self.account_nonce)));
        match &self.to {
            Some(address) => payload.extend_from_slice(&rlp::encode_bytes(address.as_bytes())),
            None => payload.extend_from_slice(&rlp::encode_bytes(&[])),
        }
        payload.extend_from_slice(&rlp::encode_bytes(&self.amount.to_be_bytes()));
        payload
    }

    /// Digest covered by the transaction signature.
    pub fn signing_digest(&self) -> Hash {
        crypto::keccak256(&rlp::encode_list(&self.unsigned_payload()))
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        let mut payload = self.unsigned_payload();
        payload.extend_from_slice(&rlp::encode_bytes(&self.signature));
        rlp::encode_list(&payload)
    }

    pub fn from_rlp(data: &[u8]) -> ChainResult<Self> {
        let item = rlp::decode(data)?;
        let fields = item.list()?;
        if fields.len() != 6 {
            return Err(ChainError::Encoding("transaction must have 6 fields".into()));
        }
        let to_bytes = fields[3].bytes()?;
        let to = if to_bytes.is_empty() {
            None
        } else {
            Some(Address::from_slice(to_bytes)?)
        };
        Ok(Self {
            tx_type: TxType::from_u8(
                u8::try_from(fields[0].uint()?)
                    .map_err(|_| ChainError::Encoding("transaction type out of range".into()))?,
            )?,
            epoch: u16::try_from(fields[1].uint()?)
                .map_err(|_| ChainError::Encoding("transaction epoch out of range".into()))?,
            account_nonce: u32::try_from(fields[2].uint()?)
                .map_err(|_| ChainError::Encoding("transaction nonce out of range".into()))?,
            to,
            amount: Coins::from_be_bytes(fields[4].bytes()?),
            signature: fields[5].bytes()?.to_vec(),
        })
    }

    pub fn hash(&self) -> Hash {
        crypto::keccak256(&self.to_rlp())
    }

    /// Canonical size in bytes; feeds the per-byte fee.
    pub fn size(&self) -> usize {
        self.to_rlp().len()
    }

    pub fn sign(&mut self, key: &SigningKey) -> ChainResult<()> {
        self.signature = crypto::sign_digest_recoverable(key, &self.signing_digest())?;
        Ok(())
    }

    /// Recovers the sender address from the signature.
    pub fn sender(&self) -> ChainResult<Address> {
        crypto::recover_address(&self.signing_digest(), &self.signature)
            .map_err(|err| ChainError::InvalidTransaction(format!("sender recovery failed: {err}")))
    }
}
