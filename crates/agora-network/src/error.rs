use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown chain tag {0}")]
    UnknownChainTag(u8),

    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
