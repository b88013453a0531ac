//! Keccak-256 hashing and secp256k1 key handling.
//!
//! Transaction signatures are recoverable ECDSA (RFC 6979 deterministic
//! nonces), so the sender address never travels on the wire.

use std::fs;
use std::path::Path;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::errors::{ChainError, ChainResult};
use crate::types::{Address, Hash};

/// Recoverable signature length: r ‖ s ‖ recovery id.
pub const SIGNATURE_LEN: usize = 65;

pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash::new(hasher.finalize().into())
}

pub fn generate_keypair() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

/// Deterministic keypair from fixed bytes; fails on out-of-range scalars.
pub fn keypair_from_seed(seed: &[u8; 32]) -> ChainResult<SigningKey> {
    SigningKey::from_slice(seed)
        .map_err(|err| ChainError::Crypto(format!("invalid secret key bytes: {err}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKeypair {
    pub public_key: String,
    pub secret_key: String,
}

pub fn load_or_generate_keypair(path: &Path) -> ChainResult<SigningKey> {
    if path.exists() {
        load_keypair(path)
    } else {
        let keypair = generate_keypair();
        save_keypair(path, &keypair)?;
        Ok(keypair)
    }
}

pub fn save_keypair(path: &Path, keypair: &SigningKey) -> ChainResult<()> {
    let public = keypair.verifying_key();
    let stored = StoredKeypair {
        public_key: hex::encode(pubkey_bytes(public)),
        secret_key: hex::encode(keypair.to_bytes()),
    };
    let encoded = toml::to_string_pretty(&stored)
        .map_err(|err| ChainError::Config(format!("failed to encode keypair: {err}")))?;
    fs::create_dir_all(path.parent().unwrap_or_else(|| Path::new(".")))?;
    fs::write(path, encoded)?;
    Ok(())
}

pub fn load_keypair(path: &Path) -> ChainResult<SigningKey> {
    let raw = fs::read_to_string(path)?;
    let stored: StoredKeypair = toml::from_str(&raw)
        .map_err(|err| ChainError::Config(format!("failed to decode keypair: {err}")))?;
    let secret_bytes = hex::decode(stored.secret_key)
        .map_err(|err| ChainError::Config(format!("invalid secret key encoding: {err}")))?;
    SigningKey::from_slice(&secret_bytes)
        .map_err(|err| ChainError::Config(format!("invalid secret key bytes: {err}")))
}

/// Uncompressed SEC1 encoding (65 bytes, `0x04` prefix).
pub fn pubkey_bytes(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}

/// The low 20 bytes of the keccak digest of the uncompressed key sans prefix.
pub fn pubkey_to_address(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let digest = keccak256(&encoded.as_bytes()[1..]);
    let mut bytes = [0u8; Address::LEN];
    bytes.copy_from_slice(&digest.as_bytes()[12..]);
    Address::new(bytes)
}

pub fn pubkey_bytes_to_address(data: &[u8]) -> ChainResult<Address> {
    let key = VerifyingKey::from_sec1_bytes(data)
        .map_err(|err| ChainError::Crypto(format!("invalid public key bytes: {err}")))?;
    Ok(pubkey_to_address(&key))
}

pub fn sign_digest_recoverable(key: &SigningKey, digest: &Hash) -> ChainResult<Vec<u8>> {
    let (signature, recovery) = key
        .sign_prehash_recoverable(digest.as_bytes())
        .map_err(|err| ChainError::Crypto(format!("signing failed: {err}")))?;
    let mut out = signature.to_bytes().as_slice().to_vec();
    out.push(recovery.to_byte());
    Ok(out)
}

pub fn recover_pubkey(digest: &Hash, signature: &[u8]) -> ChainResult<VerifyingKey> {
    if signature.len() != SIGNATURE_LEN {
        return Err(ChainError::Crypto(format!(
            "signature must be {SIGNATURE_LEN} bytes"
        )));
    }
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|err| ChainError::Crypto(format!("invalid signature bytes: {err}")))?;
    let recovery = RecoveryId::from_byte(signature[64])
        .ok_or_else(|| ChainError::Crypto("invalid recovery id".into()))?;
    VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recovery)
        .map_err(|err| ChainError::Crypto(format!("signature recovery failed: {err}")))
}

pub fn recover_address(digest: &Hash, signature: &[u8]) -> ChainResult<Address> {
    Ok(pubkey_to_address(&recover_pubkey(digest, signature)?))
}
