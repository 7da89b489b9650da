use crate::core::text::TermMatcher;
use crate::types::Candidate;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_ALLOW: &[&str] = &[
    "pizza",
    "pizzeria",
    "wood fired",
    "neapolitan",
    "sourdough",
    "bakery",
    "italian",
    "flatbread",
];

pub const DEFAULT_DENY: &[&str] = &[
    "grocery",
    "supermarket",
    "gas station",
    "convenience store",
    "ubereats",
    "uber eats",
    "doordash",
    "grubhub",
    "postmates",
    "seamless",
    "slicelife",
    "waitr",
];

/// Allow/deny term lists as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLists {
    #[serde(default = "default_allow")]
    pub allow: Vec<String>,
    #[serde(default = "default_deny")]
    pub deny: Vec<String>,
}

fn default_allow() -> Vec<String> {
    DEFAULT_ALLOW.iter().map(|s| s.to_string()).collect()
}

fn default_deny() -> Vec<String> {
    DEFAULT_DENY.iter().map(|s| s.to_string()).collect()
}

impl Default for FilterLists {
    fn default() -> Self {
        Self {
            allow: default_allow(),
            deny: default_deny(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Denied,
    OffTopic,
}

/// Coarse domain filter applied before a candidate enters the store.
///
/// Deny terms veto unconditionally; otherwise at least one allow term must
/// appear in the name, description, or category tags.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    allow: TermMatcher,
    deny: TermMatcher,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self::new(&FilterLists::default())
    }
}

impl CandidateFilter {
    pub fn new(lists: &FilterLists) -> Self {
        Self {
            allow: TermMatcher::new(&lists.allow),
            deny: TermMatcher::new(&lists.deny),
        }
    }

    pub fn is_relevant(&self, candidate: &Candidate) -> bool {
        self.classify(candidate) == Verdict::Admit
    }

    pub fn classify(&self, candidate: &Candidate) -> Verdict {
        let haystack = haystack(candidate);
        if self.deny.is_match(&haystack) {
            debug!(name = %candidate.name, "filter: denied");
            return Verdict::Denied;
        }
        if self.allow.is_match(&haystack) {
            Verdict::Admit
        } else {
            debug!(name = %candidate.name, "filter: off-topic");
            Verdict::OffTopic
        }
    }
}

fn haystack(candidate: &Candidate) -> String {
    let mut parts: Vec<&str> = vec![candidate.name.as_str()];
    if let Some(d) = &candidate.description {
        parts.push(d);
    }
    parts.extend(candidate.categories.iter().map(String::as_str));
    // Separator keeps terms from matching across field boundaries.
    parts.join(" | ")
}
