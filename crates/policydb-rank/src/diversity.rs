//! Document-diversity selection over ranked evidence.
//!
//! A report that cites ten passages of one document reads worse than one that
//! cites three documents. Selection happens in two passes: the best passage
//! of each not-yet-cited document until `diversity_target` distinct documents
//! are covered, then remaining slots fill by score. The result is re-sorted
//! by score so the engine's ordering invariant survives selection.

use std::collections::HashSet;

use policydb_core::types::RankedEvidence;

/// Pick up to `max_items` items from score-ordered `evidence`, covering at
/// least `diversity_target` distinct documents when the input allows it.
pub fn select_diverse(
    evidence: &[RankedEvidence],
    diversity_target: usize,
    max_items: usize,
) -> Vec<RankedEvidence> {
    let mut picked: Vec<RankedEvidence> = Vec::new();
    let mut seen_docs: HashSet<&str> = HashSet::new();

    for e in evidence {
        if seen_docs.len() >= diversity_target {
            break;
        }
        if seen_docs.insert(e.document_id.as_str()) {
            picked.push(e.clone());
        }
    }

    for e in evidence {
        if picked.len() >= max_items {
            break;
        }
        if picked.iter().any(|p| p.chunk_id == e.chunk_id) {
            continue;
        }
        picked.push(e.clone());
    }

    picked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.retrieval_rank.cmp(&b.retrieval_rank))
    });
    picked.truncate(max_items);
    picked
}
