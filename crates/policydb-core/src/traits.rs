use crate::error::Result;
use crate::types::{FeedbackRecord, PolicyChunk, SimilarityHit};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Turns query text into a fixed-length vector. Consumed by the pipeline,
/// never implemented by the ranking core itself.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `local:minilm-l6:d384`).
    fn provider_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Pre-built nearest-neighbour index over passage embeddings.
///
/// Distance convention, fixed once for the whole system: cosine distance,
/// lower = more similar. Results come back ordered by ascending distance.
pub trait SimilarityIndex: Send + Sync {
    fn query(&self, vector: &[f32], k: usize, timeout: Duration) -> Result<Vec<SimilarityHit>>;
}

/// Corpus metadata lookup. `Ok(None)` means the id is unknown (index/corpus
/// desync), which callers treat as a droppable hit, not a failure.
pub trait ChunkResolver: Send + Sync {
    fn resolve(&self, chunk_id: &str) -> Result<Option<PolicyChunk>>;
}

/// Durable append-only history of ranking outcomes. Appends are independent
/// and atomic per record; reads preserve insertion order. Any store with
/// those properties (log file, embedded db, queue) can stand in.
pub trait Ledger: Send + Sync {
    fn append(&self, record: &FeedbackRecord) -> Result<()>;
    fn read_recent(&self, n: usize) -> Result<Vec<FeedbackRecord>>;
    fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<FeedbackRecord>>;
}
