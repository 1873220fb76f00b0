//! EC-VRF: ECVRF-EDWARDS25519-SHA512-TAI (RFC 9381).
//!
//! A prover holding the secret key evaluates the VRF on a message and
//! obtains a pseudorandom 32-byte value plus a proof; anyone holding the
//! public key can verify the proof and recompute the exact same value.
//! The value is what sortition uses as its randomness, so the prover can
//! neither choose nor bias it without detection.
//!
//! The ciphersuite's proof-to-hash output is 64 bytes (SHA-512); it is
//! compressed to the protocol's 32-byte hash width with SHA-256.

use vrf_rfc9381::{
    Ciphersuite,
    Proof as VrfProofTrait,
    Prover as _,
    Verifier as _,
    ec::edwards25519::EdVrfProof,
    ec::edwards25519::tai::{EdVrfEdwards25519TaiPublicKey, EdVrfEdwards25519TaiSecretKey},
};

use crate::error::{CryptoError, Result};
use crate::hash::sha256;

const SUITE: Ciphersuite = Ciphersuite::ECVRF_EDWARDS25519_SHA512_TAI;

/// Serialised proof length: gamma(32) || c(16) || s(32).
pub const VRF_PROOF_LEN: usize = 80;

/// Build the prover-side secret from the 32-byte Ed25519 seed.
///
/// The same seed drives both the signing key and the VRF key, so the
/// public key recovered from a signature also verifies VRF proofs.
pub(crate) fn secret_from_seed(seed: &[u8; 32]) -> Result<EdVrfEdwards25519TaiSecretKey> {
    EdVrfEdwards25519TaiSecretKey::from_slice(seed)
        .map_err(|e| CryptoError::InvalidSecretKey(format!("{e}")))
}

/// Evaluate the VRF on `msg`. Returns `(value, proof)` where `value` is the
/// 32-byte sortition randomness and `proof` the 80-byte pi-string.
pub(crate) fn prove(sk: &EdVrfEdwards25519TaiSecretKey, msg: &[u8]) -> Result<([u8; 32], Vec<u8>)> {
    let proof = sk
        .prove(msg)
        .map_err(|e| CryptoError::VrfProofFailed(format!("{e}")))?;
    let pi = proof.encode_to_pi();
    let beta = proof
        .proof_to_hash(SUITE)
        .map_err(|e| CryptoError::VrfProofFailed(format!("proof_to_hash: {e}")))?;
    Ok((sha256(beta.as_slice()), pi))
}

/// Verify `proof` for `msg` under `pk` and return the 32-byte value it
/// commits to. Any failure (bad key bytes, malformed pi-string, failed
/// curve equation) collapses to `VrfProofInvalid`.
pub fn vrf_verify(pk: &[u8], proof: &[u8], msg: &[u8]) -> Result<[u8; 32]> {
    let verifier = EdVrfEdwards25519TaiPublicKey::from_slice(pk)
        .map_err(|_| CryptoError::VrfProofInvalid)?;
    let proof = EdVrfProof::decode_pi(proof).map_err(|_| CryptoError::VrfProofInvalid)?;
    let beta = verifier
        .verify(msg, proof)
        .map_err(|_| CryptoError::VrfProofInvalid)?;
    Ok(sha256(beta.as_slice()))
}

/// Derive the 32-byte value from a bare proof, without verifying it.
/// Only meaningful on proofs that have been (or will be) verified.
pub fn vrf_proof_to_hash(proof: &[u8]) -> Result<[u8; 32]> {
    let proof = EdVrfProof::decode_pi(proof).map_err(|_| CryptoError::VrfProofInvalid)?;
    let beta = proof
        .proof_to_hash(SUITE)
        .map_err(|_| CryptoError::VrfProofInvalid)?;
    Ok(sha256(beta.as_slice()))
}
