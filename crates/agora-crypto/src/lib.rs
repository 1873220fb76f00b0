//! # Agora Cryptography
//!
//! Cryptographic primitives for the Agora node.
//!
//! ## Features
//! - Ed25519 keypairs with recoverable (`pk || sig`) signatures
//! - EC-VRF prove / verify / proof-to-hash (RFC 9381, edwards25519)
//! - SHA-256 helpers

pub mod error;
pub mod hash;
pub mod signature;
pub mod vrf;

pub use error::{CryptoError, Result};
pub use hash::{sha256, sha256_concat};
pub use signature::{
    recover_pubkey, verify_recoverable, Keypair, PublicKey, PUBLIC_KEY_LEN,
    RECOVERABLE_SIGNATURE_LEN, SIGNATURE_LEN,
};
pub use vrf::{vrf_proof_to_hash, vrf_verify, VRF_PROOF_LEN};
