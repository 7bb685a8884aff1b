use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("progress observer disconnected")]
    StreamDisconnected,

    #[error("a block is already being mined")]
    MiningInProgress,

    /// The tip moved between the pool snapshot and the append.
    #[error("stale tip: expected previous hash {expected}, chain tip is {actual}")]
    StaleTip { expected: String, actual: String },

    #[error("invalid chain at block {index}: {reason}")]
    InvalidChain { index: u64, reason: String },

    #[error("mining session ended without sealing a block")]
    SessionIncomplete,
}
