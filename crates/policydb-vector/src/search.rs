use arrow_array::{Float32Array, Int32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use policydb_core::error::{Error, Result};
use policydb_core::traits::{ChunkResolver, SimilarityIndex};
use policydb_core::types::{PolicyChunk, SimilarityHit};

/// Similarity index + corpus metadata lookup over one LanceDB passage table.
///
/// The traits are sync; this adapter owns a tokio runtime and blocks on it,
/// so callers stay free of async plumbing. Distance convention: cosine
/// distance from the `_distance` column, lower = more similar.
pub struct LancePolicyIndex {
	db: Connection,
	table_name: String,
	rt: tokio::runtime::Runtime,
}

impl LancePolicyIndex {
	pub fn open(db_path: &Path, table_name: &str) -> Result<Self> {
		let rt = tokio::runtime::Runtime::new()
			.map_err(|e| Error::IndexUnavailable(format!("runtime: {e}")))?;
		let db = rt
			.block_on(async { connect(db_path.to_string_lossy().as_ref()).execute().await })
			.map_err(|e| Error::IndexUnavailable(format!("{}: {}", db_path.display(), e)))?;
		Ok(Self { db, table_name: table_name.to_string(), rt })
	}

	async fn query_inner(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarityHit>> {
		let table = self
			.db
			.open_table(&self.table_name)
			.execute()
			.await
			.map_err(|e| Error::IndexUnavailable(format!("open '{}': {}", self.table_name, e)))?;
		let mut stream = table
			.vector_search(vector.to_vec())
			.map_err(|e| Error::IndexUnavailable(e.to_string()))?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await
			.map_err(|e| Error::IndexUnavailable(e.to_string()))?;

		let mut hits = Vec::new();
		while let Some(batch) = stream
			.try_next()
			.await
			.map_err(|e| Error::IndexUnavailable(e.to_string()))?
		{
			let ids = string_col(&batch, "id")
				.map_err(|_| Error::IndexUnavailable("id column missing".to_string()))?;
			let distances = batch
				.column_by_name("_distance")
				.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
				.ok_or_else(|| Error::IndexUnavailable("_distance column missing".to_string()))?;
			for i in 0..batch.num_rows() {
				hits.push(SimilarityHit { chunk_id: ids.value(i).to_string(), raw_distance: distances.value(i) });
			}
		}
		debug!(k, returned = hits.len(), "similarity query");
		Ok(hits)
	}

	async fn resolve_inner(&self, chunk_id: &str) -> Result<Option<PolicyChunk>> {
		let table = self
			.db
			.open_table(&self.table_name)
			.execute()
			.await
			.map_err(|e| Error::ChunkResolution(format!("open '{}': {}", self.table_name, e)))?;
		let predicate = format!("id = '{}'", chunk_id.replace('\'', "''"));
		let mut stream = table
			.query()
			.only_if(predicate)
			.limit(1)
			.execute()
			.await
			.map_err(|e| Error::ChunkResolution(e.to_string()))?;
		while let Some(batch) = stream
			.try_next()
			.await
			.map_err(|e| Error::ChunkResolution(e.to_string()))?
		{
			if batch.num_rows() == 0 {
				continue;
			}
			return Ok(Some(decode_chunk(&batch, 0)?));
		}
		Ok(None)
	}
}

impl SimilarityIndex for LancePolicyIndex {
	fn query(&self, vector: &[f32], k: usize, timeout: Duration) -> Result<Vec<SimilarityHit>> {
		self.rt.block_on(async {
			tokio::time::timeout(timeout, self.query_inner(vector, k))
				.await
				.map_err(|_| Error::IndexUnavailable(format!("query timed out after {timeout:?}")))?
		})
	}
}

impl ChunkResolver for LancePolicyIndex {
	fn resolve(&self, chunk_id: &str) -> Result<Option<PolicyChunk>> {
		self.rt.block_on(self.resolve_inner(chunk_id))
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::ChunkResolution(format!("{name} column missing")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| Error::ChunkResolution(format!("{name} column missing")))
}

fn decode_chunk(batch: &RecordBatch, row: usize) -> Result<PolicyChunk> {
	let page_start = int_col(batch, "page_start")?.value(row).max(0) as u32;
	let page_end = int_col(batch, "page_end")?.value(row).max(0) as u32;
	Ok(PolicyChunk {
		chunk_id: string_col(batch, "id")?.value(row).to_string(),
		document_id: string_col(batch, "doc_id")?.value(row).to_string(),
		document_title: string_col(batch, "doc_title")?.value(row).to_string(),
		page_range: (page_start, page_end),
		text: string_col(batch, "content")?.value(row).to_string(),
		source_path: string_col(batch, "source_path")?.value(row).to_string(),
	})
}
