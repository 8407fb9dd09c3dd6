use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Similarity index query failed or timed out. Fatal to the ranking run.
    #[error("Similarity index unavailable: {0}")]
    IndexUnavailable(String),

    /// A chunk id could not be resolved against the corpus. Per-hit and
    /// recoverable; the ranking engine drops the hit and continues.
    #[error("Chunk resolution failed: {0}")]
    ChunkResolution(String),

    /// The persisted weight configuration is unparseable. Fatal on load;
    /// the engine refuses to rank rather than silently defaulting.
    #[error("Weight store corrupt: {0}")]
    WeightStoreCorrupt(String),

    #[error("Weight store write failed: {0}")]
    WeightStoreWrite(String),

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, Error>;
