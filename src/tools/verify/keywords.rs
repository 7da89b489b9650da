use crate::core::text::TermMatcher;
use crate::types::{Evidence, EvidenceSet, EvidenceSource};
use serde::{Deserialize, Serialize};

pub const VOCABULARY_VERSION: &str = "v1";

pub const VOCABULARY_V1: &[&str] = &["sourdough", "naturally leavened", "wild yeast", "levain"];

/// Closed, versioned keyword set that counts as a sourdough claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimVocabulary {
    pub version: String,
    pub keywords: Vec<String>,
}

impl Default for ClaimVocabulary {
    fn default() -> Self {
        Self {
            version: VOCABULARY_VERSION.to_string(),
            keywords: VOCABULARY_V1.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ClaimVocabulary {
    pub fn matcher(&self) -> ClaimMatcher {
        ClaimMatcher {
            version: self.version.clone(),
            terms: TermMatcher::new(&self.keywords),
        }
    }
}

/// Compiled vocabulary. Scans text into evidence for one source.
#[derive(Debug, Clone)]
pub struct ClaimMatcher {
    version: String,
    terms: TermMatcher,
}

impl Default for ClaimMatcher {
    fn default() -> Self {
        ClaimVocabulary::default().matcher()
    }
}

impl ClaimMatcher {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scan(&self, source: EvidenceSource, text: &str) -> EvidenceSet {
        self.terms
            .find_all(text)
            .into_iter()
            .map(|keyword| Evidence::new(source, keyword))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vocabulary_is_v1() {
        let v = ClaimVocabulary::default();
        assert_eq!(v.version, "v1");
        assert_eq!(v.keywords.len(), 4);
    }

    #[test]
    fn test_hyphenated_variant_counts_as_keyword() {
        let m = ClaimMatcher::default();
        let hits = m.scan(EvidenceSource::Website, "Our NATURALLY-LEAVENED dough rests 72h");
        assert_eq!(
            hits,
            [Evidence::new(EvidenceSource::Website, "naturally leavened")].into()
        );
    }

    #[test]
    fn test_no_claim_yields_no_evidence() {
        let m = ClaimMatcher::default();
        assert!(m
            .scan(EvidenceSource::ProfileText, "New York style slices, open late")
            .is_empty());
    }

    #[test]
    fn test_vocabulary_from_config() {
        let v: ClaimVocabulary =
            serde_json::from_str(r#"{"version":"v2","keywords":["biga","Poolish"]}"#).unwrap();
        let m = v.matcher();
        assert_eq!(m.version(), "v2");
        let hits = m.scan(EvidenceSource::SocialMedia, "48h poolish");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.iter().next().unwrap().keyword, "poolish");
    }
}
