use agora_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
