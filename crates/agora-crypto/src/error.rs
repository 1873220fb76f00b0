use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("signature too short to carry a recovery prefix")]
    SignatureTooShort,

    #[error("signature invalid")]
    InvalidSignature,

    #[error("VRF proof generation failed: {0}")]
    VrfProofFailed(String),

    #[error("VRF proof is invalid")]
    VrfProofInvalid,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
