use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::BTreeSet;
use tracing::warn;

/// Lowercase, treat hyphens/underscores/dashes as spaces, and collapse runs of
/// whitespace. Both haystacks and patterns go through this so that
/// `Naturally-Leavened` and `naturally leavened` compare equal.
pub fn fold_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| match c {
            '-' | '_' | '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' => ' ',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical business-name form: lowercase, apostrophes dropped, every other
/// non-alphanumeric run collapsed to one space.
///
/// `"Tony's  Pizza!"` → `"tonys pizza"`
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.chars() {
        if matches!(c, '\'' | '\u{2019}' | '`') {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Case- and hyphen-insensitive substring matcher over a fixed term list.
///
/// Matches report the canonical (folded) term, never the raw haystack slice.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    terms: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl TermMatcher {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| fold_text(t.as_ref()))
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect();

        let automaton = if terms.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .ascii_case_insensitive(true)
                .match_kind(MatchKind::Standard)
                .build(&terms)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    warn!("term matcher could not be built ({} terms): {}", terms.len(), e);
                    None
                }
            }
        };

        Self { terms, automaton }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Every distinct term found anywhere in `text`.
    pub fn find_all(&self, text: &str) -> BTreeSet<String> {
        let Some(ac) = &self.automaton else {
            return BTreeSet::new();
        };
        let folded = fold_text(text);
        ac.find_overlapping_iter(&folded)
            .map(|m| self.terms[m.pattern().as_usize()].clone())
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.automaton {
            Some(ac) => ac.is_match(&fold_text(text)),
            None => false,
        }
    }
}
