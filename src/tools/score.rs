use crate::types::{ConfidenceTier, EvidenceSet, EvidenceSource};
use std::collections::BTreeSet;

/// Map a candidate's evidence to a confidence tier.
///
/// * empty set: `None` (the candidate is not verified)
/// * evidence from two or more distinct sources: `High`
/// * a single source with two or more distinct keywords: `Medium`
/// * otherwise: `Low`
///
/// Depends only on the set's contents, never on insertion order.
pub fn score(evidence: &EvidenceSet) -> Option<ConfidenceTier> {
    if evidence.is_empty() {
        return None;
    }
    if distinct_sources(evidence).len() >= 2 {
        return Some(ConfidenceTier::High);
    }
    let keywords: BTreeSet<&str> = evidence.iter().map(|e| e.keyword.as_str()).collect();
    if keywords.len() >= 2 {
        Some(ConfidenceTier::Medium)
    } else {
        Some(ConfidenceTier::Low)
    }
}

pub fn distinct_sources(evidence: &EvidenceSet) -> BTreeSet<EvidenceSource> {
    evidence.iter().map(|e| e.source).collect()
}

/// Sum of evidence weights. Informational; tiering does not use it.
pub fn support(evidence: &EvidenceSet) -> f32 {
    evidence.iter().map(|e| e.weight()).sum()
}
