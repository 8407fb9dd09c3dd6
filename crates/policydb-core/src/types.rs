//! Domain types shared by the retrieval, ranking, and feedback crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ChunkId = String;

/// Weight keys understood by the ranking engine. Per-document boosts and
/// per-topic penalties are namespaced: `doc_boost:<doc_id>`,
/// `topic_penalty:<term>`.
pub const KEY_SIMILARITY_WEIGHT: &str = "similarity_weight";
pub const KEY_RECENCY_DECAY: &str = "recency_decay";
pub const KEY_KEYWORD_BOOST: &str = "keyword_boost";
pub const KEY_MIN_SCORE_FLOOR: &str = "min_score_floor";
pub const DOC_BOOST_PREFIX: &str = "doc_boost:";
pub const TOPIC_PENALTY_PREFIX: &str = "topic_penalty:";

/// A passage of a policy document, the unit indexed and retrieved.
///
/// - `chunk_id`: globally unique passage identifier
/// - `document_id`: stable document key (e.g. `nppf_2024`)
/// - `document_title`: human-readable title for citations
/// - `page_range`: inclusive first/last page of the passage
/// - `text`: the passage excerpt
/// - `source_path`: path of the source document at index-build time
///
/// Created by the external index build; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyChunk {
    pub chunk_id: ChunkId,
    pub document_id: String,
    pub document_title: String,
    pub page_range: (u32, u32),
    pub text: String,
    pub source_path: String,
}

/// One nearest-neighbour result from the similarity index.
///
/// `raw_distance` is the index's cosine distance: lower is more similar,
/// 0.0 means identical direction. The ranking engine inverts this onto a
/// score scale; nothing else interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub chunk_id: ChunkId,
    pub raw_distance: f32,
}

/// A scored, citable evidence item produced by the ranking engine.
///
/// `raw_distance` and `retrieval_rank` carry the provenance needed to audit
/// `final_score` from the output alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEvidence {
    pub chunk_id: ChunkId,
    pub document_id: String,
    pub document_title: String,
    pub page_range: (u32, u32),
    pub excerpt_text: String,
    pub final_score: f64,
    pub source_path: String,
    pub raw_distance: f32,
    pub retrieval_rank: usize,
}

/// Non-fatal signals from one ranking run, returned alongside the evidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankDiagnostics {
    /// Hits whose chunk id could not be resolved against the corpus.
    pub dropped_hits: usize,
    /// Hits discarded because a better-scoring occurrence of the same chunk won.
    pub duplicate_hits: usize,
    pub mean_final_score: f64,
}

/// Named ranking-weight configuration.
///
/// A flat string-to-float map plus a monotonically increasing version and a
/// last-updated timestamp; round-trips exactly through serde. Loaded before a
/// ranking run and never mutated mid-run; only the tuner produces new
/// versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub weights: BTreeMap<String, f64>,
}

impl WeightConfig {
    /// Built-in defaults, version 0. The floor of 0.1 mirrors the shipped
    /// relevance config this engine replaces.
    pub fn defaults() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(KEY_SIMILARITY_WEIGHT.to_string(), 1.0);
        weights.insert(KEY_RECENCY_DECAY.to_string(), 0.0);
        weights.insert(KEY_KEYWORD_BOOST.to_string(), 0.0);
        weights.insert(KEY_MIN_SCORE_FLOOR.to_string(), 0.1);
        Self { version: 0, updated_at: Utc::now(), weights }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.weights.get(key).copied()
    }

    pub fn set(&mut self, key: &str, value: f64) {
        self.weights.insert(key.to_string(), value);
    }

    pub fn similarity_weight(&self) -> f64 {
        self.get(KEY_SIMILARITY_WEIGHT).unwrap_or(1.0)
    }

    pub fn recency_decay(&self) -> f64 {
        self.get(KEY_RECENCY_DECAY).unwrap_or(0.0)
    }

    pub fn keyword_boost(&self) -> f64 {
        self.get(KEY_KEYWORD_BOOST).unwrap_or(0.0)
    }

    pub fn min_score_floor(&self) -> f64 {
        self.get(KEY_MIN_SCORE_FLOOR).unwrap_or(0.0)
    }

    pub fn doc_boost(&self, document_id: &str) -> f64 {
        self.get(&format!("{DOC_BOOST_PREFIX}{document_id}")).unwrap_or(0.0)
    }

    /// All `topic_penalty:<term>` entries as `(term, penalty)` pairs, in key
    /// order.
    pub fn topic_penalties(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().filter_map(|(k, v)| {
            k.strip_prefix(TOPIC_PENALTY_PREFIX).map(|term| (term, *v))
        })
    }
}

/// One ranking outcome with its externally assessed quality, as appended to
/// the feedback ledger. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub record_id: String,
    pub query_text: String,
    pub evidence_snapshot: Vec<RankedEvidence>,
    /// External quality assessment on a 0-100 scale.
    pub quality_score: f64,
    pub weight_version_used: u64,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(
        query_text: impl Into<String>,
        evidence_snapshot: Vec<RankedEvidence>,
        quality_score: f64,
        weight_version_used: u64,
    ) -> Self {
        let query_text = query_text.into();
        let timestamp = Utc::now();
        let record_id = record_id_for(&timestamp, &query_text);
        Self {
            record_id,
            query_text,
            evidence_snapshot,
            quality_score,
            weight_version_used,
            timestamp,
        }
    }
}

/// Content-derived record identity: blake3 over timestamp + query text,
/// truncated to 16 hex chars. Stable enough for tuning rationale lines.
pub fn record_id_for(timestamp: &DateTime<Utc>, query_text: &str) -> String {
    let digest = blake3::hash(format!("{}|{}", timestamp.to_rfc3339(), query_text).as_bytes());
    digest.to_hex().as_str()[..16].to_string()
}
