use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    /// A step exceeded its timer with insufficient votes. Control flow,
    /// not a failure: reduction and BinaryBA branch on it.
    #[error("count votes timed out")]
    CountVotesTimeout,

    #[error("verification failed: {0}")]
    VerifyFailed(String),

    #[error("message does not extend the current chain")]
    ParentMismatch,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// BinaryBA ran out of steps without agreement. Fatal: the engine for
    /// that chain stops.
    #[error("binary agreement exhausted {0} steps without consensus")]
    MaxStepsExhausted(u64),

    #[error(transparent)]
    Core(#[from] agora_core::CoreError),

    #[error(transparent)]
    Crypto(#[from] agora_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
