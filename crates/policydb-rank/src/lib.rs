//! Weighted re-ranking of similarity hits into citable evidence.
//!
//! `rank` is a pure function of the hits, the resolved passage metadata, and
//! one `WeightConfig`: identical inputs always produce byte-identical output.
//! It reads no clocks and keeps no state, so concurrent ranking runs are
//! trivially safe.

use serde::{Deserialize, Serialize};
use tracing::warn;

use policydb_core::traits::ChunkResolver;
use policydb_core::types::{PolicyChunk, RankDiagnostics, RankedEvidence, SimilarityHit, WeightConfig};

pub mod diversity;
pub mod gate;

pub use diversity::select_diverse;
pub use gate::{require_evidence, EvidenceCheck};

/// Per-run options that are configuration, not tunable weights: the keyword
/// list the `keyword_boost` weight applies to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankOptions {
    pub keywords: Vec<String>,
}

/// Ranked evidence plus the non-fatal signals gathered along the way.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub evidence: Vec<RankedEvidence>,
    pub diagnostics: RankDiagnostics,
}

/// Map a raw cosine distance onto a [0, 1] score. Lower distance = higher
/// score; the inverse of the index's distance convention.
pub fn normalize_distance(raw_distance: f32) -> f64 {
    (1.0 - f64::from(raw_distance)).clamp(0.0, 1.0)
}

/// Rank similarity hits against the corpus under the given weights.
///
/// Hits whose chunk id cannot be resolved are dropped (counted, warned),
/// never fatal. Duplicate chunk ids keep the higher-scoring occurrence.
/// Output is sorted by `final_score` descending, exact ties broken by
/// ascending original retrieval rank, truncated to `top_n`.
pub fn rank(
    hits: &[SimilarityHit],
    resolver: &dyn ChunkResolver,
    weights: &WeightConfig,
    opts: &RankOptions,
    top_n: usize,
) -> RankOutcome {
    debug_assert!(top_n > 0, "top_n must be positive");
    let mut diagnostics = RankDiagnostics::default();
    let mut scored: Vec<RankedEvidence> = Vec::with_capacity(hits.len());

    for (retrieval_rank, hit) in hits.iter().enumerate() {
        let chunk = match resolver.resolve(&hit.chunk_id) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                warn!(chunk_id = %hit.chunk_id, "hit references unknown chunk; dropping");
                diagnostics.dropped_hits += 1;
                continue;
            }
            Err(e) => {
                warn!(chunk_id = %hit.chunk_id, error = %e, "chunk lookup failed; dropping hit");
                diagnostics.dropped_hits += 1;
                continue;
            }
        };

        let final_score = score_chunk(&chunk, hit.raw_distance, weights, opts);
        let candidate = RankedEvidence {
            chunk_id: chunk.chunk_id,
            document_id: chunk.document_id,
            document_title: chunk.document_title,
            page_range: chunk.page_range,
            excerpt_text: chunk.text,
            final_score,
            source_path: chunk.source_path,
            raw_distance: hit.raw_distance,
            retrieval_rank,
        };

        match scored.iter_mut().find(|e| e.chunk_id == candidate.chunk_id) {
            Some(existing) => {
                diagnostics.duplicate_hits += 1;
                if candidate.final_score > existing.final_score {
                    *existing = candidate;
                }
            }
            None => scored.push(candidate),
        }
    }

    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.retrieval_rank.cmp(&b.retrieval_rank))
    });
    scored.truncate(top_n);

    diagnostics.mean_final_score = if scored.is_empty() {
        0.0
    } else {
        scored.iter().map(|e| e.final_score).sum::<f64>() / scored.len() as f64
    };

    RankOutcome { evidence: scored, diagnostics }
}

/// The score formula. Every term is a function of the hit, the chunk's
/// static metadata, and the weights; with an empty keyword list and no
/// `topic_penalty:*` keys the last two terms vanish.
fn score_chunk(chunk: &PolicyChunk, raw_distance: f32, weights: &WeightConfig, opts: &RankOptions) -> f64 {
    let mut score = weights.similarity_weight() * normalize_distance(raw_distance)
        + weights.doc_boost(&chunk.document_id)
        + recency_term(&chunk.document_id, weights.recency_decay());

    if weights.keyword_boost() != 0.0 && !opts.keywords.is_empty() {
        score += weights.keyword_boost() * keyword_signal(&chunk.text, &opts.keywords);
    }

    let text_lower = chunk.text.to_lowercase();
    for (term, penalty) in weights.topic_penalties() {
        if text_lower.contains(term) {
            score -= penalty;
        }
    }

    score.max(weights.min_score_floor())
}

/// Newer plan documents outrank superseded ones at equal similarity. The
/// adoption year is encoded in the document id suffix (`nppf_2024` -> 2024);
/// no year means no recency contribution. The affine map sends 1990 -> 0.0
/// and 2030 -> 1.0, so the term never reads a clock and scoring stays pure.
fn recency_term(document_id: &str, recency_decay: f64) -> f64 {
    if recency_decay == 0.0 {
        return 0.0;
    }
    match adoption_year(document_id) {
        Some(year) => recency_decay * ((f64::from(year) - 1990.0) / 40.0).clamp(0.0, 1.0),
        None => 0.0,
    }
}

fn adoption_year(document_id: &str) -> Option<i32> {
    let suffix = document_id.rsplit('_').next()?;
    let year: i32 = suffix.parse().ok()?;
    (1900..=2100).contains(&year).then_some(year)
}

/// Fraction of matched keywords, saturating at three hits. Keywords shorter
/// than four characters are ignored to keep stop-words out of the signal.
fn keyword_signal(text: &str, keywords: &[String]) -> f64 {
    let text_lower = text.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|kw| kw.len() > 3 && text_lower.contains(&kw.to_lowercase()))
        .count();
    (hits as f64 / 3.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use policydb_core::error::Result;

    struct MapResolver(Vec<PolicyChunk>);

    impl ChunkResolver for MapResolver {
        fn resolve(&self, chunk_id: &str) -> Result<Option<PolicyChunk>> {
            Ok(self.0.iter().find(|c| c.chunk_id == chunk_id).cloned())
        }
    }

    fn chunk(chunk_id: &str, document_id: &str, text: &str) -> PolicyChunk {
        PolicyChunk {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            document_title: document_id.to_uppercase(),
            page_range: (1, 2),
            text: text.to_string(),
            source_path: format!("corpus/{document_id}.pdf"),
        }
    }

    fn hit(chunk_id: &str, raw_distance: f32) -> SimilarityHit {
        SimilarityHit { chunk_id: chunk_id.to_string(), raw_distance }
    }

    fn plain_weights() -> WeightConfig {
        // similarity only: no floor, no recency, no boosts
        let mut w = WeightConfig::defaults();
        w.set("min_score_floor", 0.0);
        w
    }

    #[test]
    fn duplicated_chunk_keeps_better_occurrence() {
        // The worked example: distances [0.10, 0.25, 0.10], first and third
        // the same chunk, similarity_weight 1.0, top_n 2.
        let resolver = MapResolver(vec![
            chunk("a", "nppf_2024", "housing delivery"),
            chunk("b", "dap_2020", "design quality"),
        ]);
        let hits = vec![hit("a", 0.10), hit("b", 0.25), hit("a", 0.10)];
        let out = rank(&hits, &resolver, &plain_weights(), &RankOptions::default(), 2);

        assert_eq!(out.evidence.len(), 2);
        assert_eq!(out.evidence[0].chunk_id, "a");
        assert!((out.evidence[0].final_score - 0.90).abs() < 1e-6);
        assert_eq!(out.evidence[1].chunk_id, "b");
        assert!((out.evidence[1].final_score - 0.75).abs() < 1e-6);
        assert_eq!(out.diagnostics.duplicate_hits, 1);
    }

    #[test]
    fn rank_is_deterministic() {
        let resolver = MapResolver(vec![
            chunk("a", "nppf_2024", "housing"),
            chunk("b", "dap_2020", "design"),
            chunk("c", "csucp_2015", "transport"),
        ]);
        let hits = vec![hit("a", 0.2), hit("b", 0.4), hit("c", 0.3)];
        let mut w = plain_weights();
        w.set("recency_decay", 0.1);
        w.set("doc_boost:dap_2020", 0.05);

        let first = rank(&hits, &resolver, &w, &RankOptions::default(), 10);
        let second = rank(&hits, &resolver, &w, &RankOptions::default(), 10);
        let a = serde_json::to_string(&first.evidence).expect("serialize");
        let b = serde_json::to_string(&second.evidence).expect("serialize");
        assert_eq!(a, b);
    }

    #[test]
    fn exact_ties_break_by_retrieval_rank() {
        let resolver = MapResolver(vec![
            chunk("a", "nppf_2024", "x"),
            chunk("b", "nppf_2024", "y"),
        ]);
        let hits = vec![hit("a", 0.5), hit("b", 0.5)];
        let out = rank(&hits, &resolver, &plain_weights(), &RankOptions::default(), 2);
        assert_eq!(out.evidence[0].chunk_id, "a");
        assert_eq!(out.evidence[1].chunk_id, "b");
        for pair in out.evidence.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
    }

    #[test]
    fn unresolved_hits_are_dropped_not_fatal() {
        let resolver = MapResolver(vec![chunk("a", "nppf_2024", "x")]);
        let hits = vec![hit("ghost", 0.1), hit("a", 0.2)];
        let out = rank(&hits, &resolver, &plain_weights(), &RankOptions::default(), 5);
        assert_eq!(out.evidence.len(), 1);
        assert_eq!(out.diagnostics.dropped_hits, 1);
    }

    #[test]
    fn empty_hits_give_empty_outcome() {
        let resolver = MapResolver(vec![]);
        let out = rank(&[], &resolver, &plain_weights(), &RankOptions::default(), 5);
        assert!(out.evidence.is_empty());
        assert_eq!(out.diagnostics.mean_final_score, 0.0);
    }

    #[test]
    fn truncates_to_top_n() {
        let resolver = MapResolver(vec![
            chunk("a", "nppf_2024", "x"),
            chunk("b", "dap_2020", "y"),
            chunk("c", "csucp_2015", "z"),
        ]);
        let hits = vec![hit("a", 0.1), hit("b", 0.2), hit("c", 0.3)];
        let out = rank(&hits, &resolver, &plain_weights(), &RankOptions::default(), 2);
        assert_eq!(out.evidence.len(), 2);

        let all = rank(&hits, &resolver, &plain_weights(), &RankOptions::default(), 10);
        assert_eq!(all.evidence.len(), 3, "fewer hits than top_n returns all");
    }

    #[test]
    fn doc_boost_and_recency_shift_scores() {
        let resolver = MapResolver(vec![
            chunk("old", "csucp_2015", "retail frontage"),
            chunk("new", "nppf_2024", "retail frontage"),
        ]);
        let hits = vec![hit("old", 0.3), hit("new", 0.3)];
        let mut w = plain_weights();
        w.set("recency_decay", 0.2);
        let out = rank(&hits, &resolver, &w, &RankOptions::default(), 2);
        assert_eq!(out.evidence[0].chunk_id, "new", "newer plan wins the tie on recency");
    }

    #[test]
    fn topic_penalty_and_floor() {
        let resolver = MapResolver(vec![chunk("a", "dap_2020", "leisure and tourism uses")]);
        let mut w = plain_weights();
        w.set("topic_penalty:leisure", 0.5);
        w.set("topic_penalty:tourism", 0.5);
        w.set("min_score_floor", 0.1);
        let out = rank(&[hit("a", 0.2)], &resolver, &w, &RankOptions::default(), 1);
        // 0.8 - 0.5 - 0.5 < 0.1 -> floored
        assert!((out.evidence[0].final_score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn keyword_boost_saturates() {
        let resolver = MapResolver(vec![
            chunk("a", "dap_2020", "dwelling extension conservation heritage setting"),
            chunk("b", "dap_2020", "unrelated passage"),
        ]);
        let mut w = plain_weights();
        w.set("keyword_boost", 0.3);
        let opts = RankOptions {
            keywords: vec![
                "dwelling".to_string(),
                "extension".to_string(),
                "conservation".to_string(),
                "heritage".to_string(),
            ],
        };
        let out = rank(&[hit("a", 0.5), hit("b", 0.5)], &resolver, &w, &opts, 2);
        assert_eq!(out.evidence[0].chunk_id, "a");
        // four matches saturate at 3/3
        assert!((out.evidence[0].final_score - (0.5 + 0.3)).abs() < 1e-9);
    }
}
