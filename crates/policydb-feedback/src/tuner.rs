//! Bounded, deterministic weight tuning from accumulated feedback.
//!
//! The tuner is stateless: everything it knows arrives in the batch and the
//! current config, everything it decides leaves in the `TuningDecision`.
//! Below `min_records` the current configuration is never perturbed. Above
//! it, each adjusted weight moves by at most `max_step` per invocation and
//! stays inside its configured range, so repeated noisy feedback cannot walk
//! the config anywhere unstable.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use policydb_core::types::{FeedbackRecord, WeightConfig, DOC_BOOST_PREFIX, KEY_SIMILARITY_WEIGHT};

/// Tuning parameters. Loaded from the `tuner.*` config block; the defaults
/// mirror the clamp ranges the production weights file shipped with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    pub min_records: usize,
    /// Reports scoring below this (0-100) push the weights that produced
    /// their evidence down; above it, up.
    pub quality_threshold: f64,
    pub step_scale: f64,
    /// Hard cap on any single weight's per-invocation change.
    pub max_step: f64,
    pub similarity_range: (f64, f64),
    pub doc_boost_range: (f64, f64),
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_records: 3,
            quality_threshold: 60.0,
            step_scale: 0.1,
            max_step: 0.05,
            similarity_range: (0.25, 2.0),
            doc_boost_range: (-0.25, 0.25),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightChange {
    pub key: String,
    pub before: f64,
    pub after: f64,
}

/// One tuner invocation's output. `rationale` lists the record ids
/// considered; empty means the batch was too small and the weights came
/// back untouched.
#[derive(Debug, Clone)]
pub struct TuningDecision {
    pub weights: WeightConfig,
    pub rationale: Vec<String>,
    pub changes: Vec<WeightChange>,
}

impl TuningDecision {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Adjust `current` from a batch of ledger records.
///
/// Deterministic: same batch + same starting weights = same decision. Each
/// document seen in a record's evidence contributes that record's quality
/// deviation to its `doc_boost:*` key; the overall mean deviation nudges
/// `similarity_weight`. All steps are clamped.
pub fn tune(batch: &[FeedbackRecord], current: &WeightConfig, cfg: &TunerConfig) -> TuningDecision {
    if batch.len() < cfg.min_records {
        return TuningDecision { weights: current.clone(), rationale: Vec::new(), changes: Vec::new() };
    }

    // Per-document deviation sums, keyed in sorted order for determinism.
    let mut doc_signals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut overall_sum = 0.0;
    for rec in batch {
        let deviation = (rec.quality_score - cfg.quality_threshold) / 100.0;
        overall_sum += deviation;
        // A document counts once per record however many passages it contributed.
        let docs: BTreeSet<&str> = rec.evidence_snapshot.iter().map(|e| e.document_id.as_str()).collect();
        for doc in docs {
            let entry = doc_signals.entry(doc.to_string()).or_insert((0.0, 0));
            entry.0 += deviation;
            entry.1 += 1;
        }
    }

    let mut next = current.clone();
    let mut changes = Vec::new();

    let overall_mean = overall_sum / batch.len() as f64;
    let sim_before = current.similarity_weight();
    let sim_after = step(sim_before, overall_mean, cfg, cfg.similarity_range);
    if sim_after != sim_before {
        next.set(KEY_SIMILARITY_WEIGHT, sim_after);
        changes.push(WeightChange { key: KEY_SIMILARITY_WEIGHT.to_string(), before: sim_before, after: sim_after });
    }

    for (doc, (sum, n)) in &doc_signals {
        let mean = sum / *n as f64;
        let key = format!("{DOC_BOOST_PREFIX}{doc}");
        let before = current.doc_boost(doc);
        let after = step(before, mean, cfg, cfg.doc_boost_range);
        if after != before {
            next.set(&key, after);
            changes.push(WeightChange { key, before, after });
        }
    }

    info!(
        records = batch.len(),
        adjusted = changes.len(),
        mean_deviation = overall_mean,
        "tuning pass complete"
    );

    TuningDecision {
        weights: next,
        rationale: batch.iter().map(|r| r.record_id.clone()).collect(),
        changes,
    }
}

/// One clamped step: proportional to the signal, capped at `max_step`, and
/// the result pinned inside `range`.
fn step(before: f64, signal: f64, cfg: &TunerConfig, range: (f64, f64)) -> f64 {
    let delta = (cfg.step_scale * signal).clamp(-cfg.max_step, cfg.max_step);
    (before + delta).clamp(range.0, range.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use policydb_core::types::RankedEvidence;

    fn evidence(document_id: &str) -> RankedEvidence {
        RankedEvidence {
            chunk_id: format!("{document_id}:p1:0"),
            document_id: document_id.to_string(),
            document_title: document_id.to_uppercase(),
            page_range: (1, 1),
            excerpt_text: String::new(),
            final_score: 0.5,
            source_path: String::new(),
            raw_distance: 0.5,
            retrieval_rank: 0,
        }
    }

    fn record(query: &str, quality: f64, docs: &[&str]) -> FeedbackRecord {
        FeedbackRecord::new(query, docs.iter().map(|d| evidence(d)).collect(), quality, 1)
    }

    #[test]
    fn small_batch_is_a_noop_with_empty_rationale() {
        let current = WeightConfig::defaults();
        let batch = vec![record("a", 10.0, &["nppf_2024"]), record("b", 10.0, &["nppf_2024"])];
        let decision = tune(&batch, &current, &TunerConfig::default());
        assert!(decision.is_noop());
        assert!(decision.rationale.is_empty());
        assert_eq!(decision.weights, current);
        assert_eq!(decision.weights.version, current.version);
    }

    #[test]
    fn poor_reports_push_their_documents_down() {
        let current = WeightConfig::defaults();
        let batch = vec![
            record("a", 20.0, &["csucp_2015"]),
            record("b", 30.0, &["csucp_2015"]),
            record("c", 25.0, &["csucp_2015", "nppf_2024"]),
        ];
        let decision = tune(&batch, &current, &TunerConfig::default());
        assert!(!decision.is_noop());
        assert!(decision.weights.doc_boost("csucp_2015") < 0.0);
        assert_eq!(decision.rationale.len(), 3);
    }

    #[test]
    fn good_reports_push_their_documents_up() {
        let current = WeightConfig::defaults();
        let batch = vec![
            record("a", 90.0, &["nppf_2024"]),
            record("b", 85.0, &["nppf_2024"]),
            record("c", 95.0, &["nppf_2024"]),
        ];
        let decision = tune(&batch, &current, &TunerConfig::default());
        assert!(decision.weights.doc_boost("nppf_2024") > 0.0);
    }

    #[test]
    fn every_step_is_bounded_and_clamped() {
        let cfg = TunerConfig::default();
        let current = WeightConfig::defaults();
        // Worst-case signal: all reports at quality 0.
        let batch = vec![
            record("a", 0.0, &["dap_2020"]),
            record("b", 0.0, &["dap_2020"]),
            record("c", 0.0, &["dap_2020"]),
        ];
        let decision = tune(&batch, &current, &cfg);
        for change in &decision.changes {
            assert!(
                (change.after - change.before).abs() <= cfg.max_step + 1e-12,
                "step for {} exceeded max_step",
                change.key
            );
        }
        assert!(decision.weights.similarity_weight() >= cfg.similarity_range.0);
        assert!(decision.weights.doc_boost("dap_2020") >= cfg.doc_boost_range.0);
    }

    #[test]
    fn repeated_tuning_cannot_escape_the_range() {
        let cfg = TunerConfig::default();
        let mut current = WeightConfig::defaults();
        let batch = vec![
            record("a", 0.0, &["dap_2020"]),
            record("b", 0.0, &["dap_2020"]),
            record("c", 0.0, &["dap_2020"]),
        ];
        for _ in 0..50 {
            current = tune(&batch, &current, &cfg).weights;
        }
        assert!(current.doc_boost("dap_2020") >= cfg.doc_boost_range.0);
        assert!(current.similarity_weight() >= cfg.similarity_range.0);
    }

    #[test]
    fn tuning_is_deterministic() {
        let current = WeightConfig::defaults();
        let batch = vec![
            record("a", 80.0, &["nppf_2024", "dap_2020"]),
            record("b", 30.0, &["csucp_2015"]),
            record("c", 55.0, &["dap_2020"]),
        ];
        let one = tune(&batch, &current, &TunerConfig::default());
        let two = tune(&batch, &current, &TunerConfig::default());
        assert_eq!(one.weights, two.weights);
        assert_eq!(one.rationale, two.rationale);
    }
}
