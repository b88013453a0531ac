//! Verifiable random function over NIST P-256.
//!
//! The proof is a deterministic RFC 6979 ECDSA signature over the evaluation
//! input prefixed with the caller's chain public key; the randomness is the
//! Keccak-256 digest of the signature. Because the chain key lives on a
//! different curve, the proof carries the SEC1-compressed VRF public key and
//! the VRF secret is derived from the chain secret.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::crypto::keccak256;
use crate::errors::{ChainError, ChainResult};
use crate::types::Hash;

const VRF_KEY_DOMAIN: &[u8] = b"dna.vrf.key";
const VRF_PUBKEY_LEN: usize = 33;
const VRF_SIGNATURE_LEN: usize = 64;

/// Compressed VRF public key followed by the signature.
pub const PROOF_LEN: usize = VRF_PUBKEY_LEN + VRF_SIGNATURE_LEN;

pub struct VrfSigner {
    key: SigningKey,
}

impl VrfSigner {
    /// Derives the VRF secret deterministically from the chain secret.
    pub fn from_entropy(entropy: &[u8]) -> ChainResult<Self> {
        let mut material = Vec::with_capacity(VRF_KEY_DOMAIN.len() + entropy.len());
        material.extend_from_slice(VRF_KEY_DOMAIN);
        material.extend_from_slice(entropy);
        let digest = keccak256(&material);
        let key = SigningKey::from_slice(digest.as_bytes())
            .map_err(|err| ChainError::Crypto(format!("vrf key derivation failed: {err}")))?;
        Ok(Self { key })
    }

    /// Evaluates the VRF; `binding` is the caller's chain public key so the
    /// output is domain-separated per identity.
    pub fn evaluate(&self, binding: &[u8], data: &[u8]) -> (Hash, Vec<u8>) {
        let message = vrf_message(binding, data);
        let signature: Signature = self.key.sign(&message);
        let public = self.key.verifying_key().to_encoded_point(true);
        let mut proof = Vec::with_capacity(PROOF_LEN);
        proof.extend_from_slice(public.as_bytes());
        proof.extend_from_slice(signature.to_bytes().as_slice());
        let randomness = keccak256(&proof[VRF_PUBKEY_LEN..]);
        (randomness, proof)
    }
}

/// Verifies a proof and its claimed randomness for the given binding and data.
pub fn verify(binding: &[u8], data: &[u8], randomness: &Hash, proof: &[u8]) -> ChainResult<()> {
    if proof.len() != PROOF_LEN {
        return Err(ChainError::InvalidSeed(format!(
            "vrf proof must be {PROOF_LEN} bytes"
        )));
    }
    let public = VerifyingKey::from_sec1_bytes(&proof[..VRF_PUBKEY_LEN])
        .map_err(|err| ChainError::InvalidSeed(format!("invalid vrf public key: {err}")))?;
    let signature = Signature::from_slice(&proof[VRF_PUBKEY_LEN..])
        .map_err(|err| ChainError::InvalidSeed(format!("invalid vrf signature: {err}")))?;
    let message = vrf_message(binding, data);
    public
        .verify(&message, &signature)
        .map_err(|_| ChainError::InvalidSeed("vrf proof verification failed".into()))?;
    let expected = keccak256(&proof[VRF_PUBKEY_LEN..]);
    if expected != *randomness {
        return Err(ChainError::InvalidSeed("vrf randomness mismatch".into()));
    }
    Ok(())
}

fn vrf_message(binding: &[u8], data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(binding.len() + data.len());
    message.extend_from_slice(binding);
    message.extend_from_slice(data);
    message
}
