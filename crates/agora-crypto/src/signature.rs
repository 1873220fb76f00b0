//! Ed25519 keys and recoverable signatures.
//!
//! Signatures on the wire are `pubkey(32) || sig(64)`, so a verifier
//! recovers the signing key from the signature alone; vote messages do
//! not need a separate pubkey field.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::vrf;
use vrf_rfc9381::ec::edwards25519::tai::EdVrfEdwards25519TaiSecretKey;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;
/// pubkey prefix + detached signature.
pub const RECOVERABLE_SIGNATURE_LEN: usize = PUBLIC_KEY_LEN + SIGNATURE_LEN;

/// A validated Ed25519 public key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LEN],
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("{} bytes", bytes.len())))?;
        VerifyingKey::from_bytes(&arr)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("{e}")))?;
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Verify a recoverable signature (`pk || sig`) over `msg` against this
    /// key. The embedded prefix is ignored; only the detached part counts.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() < RECOVERABLE_SIGNATURE_LEN {
            return Err(CryptoError::SignatureTooShort);
        }
        let key = VerifyingKey::from_bytes(&self.bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("{e}")))?;
        let sig = Signature::from_slice(&signature[PUBLIC_KEY_LEN..])
            .map_err(|_| CryptoError::InvalidSignature)?;
        key.verify(msg, &sig).map_err(|_| CryptoError::InvalidSignature)
    }

    /// Verify a VRF proof under this key and return the 32-byte value.
    pub fn verify_vrf(&self, proof: &[u8], msg: &[u8]) -> Result<[u8; 32]> {
        vrf::vrf_verify(&self.bytes, proof, msg)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey(0x{})", hex::encode(self.bytes))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.bytes))
    }
}

/// Recover the public key embedded in a recoverable signature.
pub fn recover_pubkey(signature: &[u8]) -> Result<PublicKey> {
    if signature.len() < RECOVERABLE_SIGNATURE_LEN {
        return Err(CryptoError::SignatureTooShort);
    }
    PublicKey::from_bytes(&signature[..PUBLIC_KEY_LEN])
}

/// Recover the signer from `signature` and verify it over `msg` in one go.
pub fn verify_recoverable(msg: &[u8], signature: &[u8]) -> Result<PublicKey> {
    let pubkey = recover_pubkey(signature)?;
    pubkey.verify(msg, signature)?;
    Ok(pubkey)
}

/// Node identity: one 32-byte seed drives both the Ed25519 signer and the
/// VRF prover, so both operations answer to the same public key.
pub struct Keypair {
    seed: [u8; 32],
    signing: SigningKey,
    vrf: EdVrfEdwards25519TaiSecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed).expect("freshly generated 32-byte seed is always valid")
    }

    /// Reconstruct the keypair from its 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Result<Self> {
        let signing = SigningKey::from_bytes(&seed);
        let vrf = vrf::secret_from_seed(&seed)?;
        let public = PublicKey {
            bytes: signing.verifying_key().to_bytes(),
        };
        Ok(Self { seed, signing, vrf, public })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The raw seed, for keystore round-trips. Handle with care.
    pub fn seed_bytes(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Sign `msg`, producing the recoverable `pk || sig` layout.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        let sig = self.signing.sign(msg);
        let mut out = Vec::with_capacity(RECOVERABLE_SIGNATURE_LEN);
        out.extend_from_slice(&self.public.bytes);
        out.extend_from_slice(&sig.to_bytes());
        out
    }

    /// Evaluate the VRF on `msg`. Returns `(value, proof)`.
    pub fn evaluate(&self, msg: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let (value, proof) = vrf::prove(&self.vrf, msg)?;
        Ok((value.to_vec(), proof))
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}
