//! Evidence-sufficiency gate: no report section without enough citations.

use policydb_core::types::RankedEvidence;

/// Outcome of the sufficiency check. Insufficient evidence is a defined
/// outcome the report layer renders as such, not an error.
#[derive(Debug, Clone)]
pub enum EvidenceCheck {
    Sufficient(Vec<RankedEvidence>),
    Insufficient { found: usize, required: usize },
}

impl EvidenceCheck {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, EvidenceCheck::Sufficient(_))
    }
}

pub fn require_evidence(evidence: Vec<RankedEvidence>, min_results: usize) -> EvidenceCheck {
    if evidence.len() < min_results {
        EvidenceCheck::Insufficient { found: evidence.len(), required: min_results }
    } else {
        EvidenceCheck::Sufficient(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(chunk_id: &str) -> RankedEvidence {
        RankedEvidence {
            chunk_id: chunk_id.to_string(),
            document_id: "nppf_2024".to_string(),
            document_title: "NPPF".to_string(),
            page_range: (1, 1),
            excerpt_text: String::new(),
            final_score: 0.5,
            source_path: String::new(),
            raw_distance: 0.5,
            retrieval_rank: 0,
        }
    }

    #[test]
    fn two_items_fail_a_minimum_of_three() {
        let check = require_evidence(vec![item("a"), item("b")], 3);
        assert!(!check.is_sufficient());
        match check {
            EvidenceCheck::Insufficient { found, required } => {
                assert_eq!((found, required), (2, 3));
            }
            EvidenceCheck::Sufficient(_) => panic!("expected insufficient"),
        }
    }

    #[test]
    fn three_items_pass() {
        let check = require_evidence(vec![item("a"), item("b"), item("c")], 3);
        assert!(check.is_sufficient());
    }
}
