use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// MiniLM-class sentence encoders produce 384-dim vectors.
pub const EMBEDDING_DIM: i32 = 384;

/// The passage table the external index build writes and this crate reads.
/// Query results additionally carry a `_distance` column: cosine distance,
/// lower = more similar.
pub fn build_passage_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("doc_title", DataType::Utf8, false),
		Field::new("page_start", DataType::Int32, false),
		Field::new("page_end", DataType::Int32, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("source_path", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), EMBEDDING_DIM), true),
	]))
}
