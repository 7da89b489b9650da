use crate::core::text::normalize_name;
use crate::types::{Candidate, EvidenceSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Geohash precision of the store's identity bucket (~150 m cells).
pub const IDENTITY_GEOHASH_PRECISION: usize = 7;

/// Normalized name plus, when coordinates are known, a ~150 m geo bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn for_candidate(candidate: &Candidate) -> Self {
        let name = normalize_name(&candidate.name);
        match candidate
            .location
            .and_then(|p| p.bucket(IDENTITY_GEOHASH_PRECISION))
        {
            Some(cell) => Self(format!("{}@{}", name, cell)),
            None => Self(name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCandidate {
    pub key: IdentityKey,
    pub candidate: Candidate,
    pub evidence: EvidenceSet,
}

/// Insertion-ordered candidate map with O(1) key lookup.
///
/// First sighting wins for base fields. Evidence only ever grows.
#[derive(Debug, Default)]
pub struct CandidateStore {
    entries: Vec<StoredCandidate>,
    index: HashMap<IdentityKey, usize>,
}

pub type SharedStore = Arc<Mutex<CandidateStore>>;

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Returns `true` when the candidate was not seen before.
    pub fn upsert(&mut self, candidate: Candidate) -> bool {
        let key = IdentityKey::for_candidate(&candidate);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(StoredCandidate {
            key,
            candidate,
            evidence: EvidenceSet::new(),
        });
        true
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&StoredCandidate> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Union a worker's finished evidence set into the entry. Returns `false`
    /// for an unknown key.
    pub fn attach_evidence(&mut self, key: &IdentityKey, evidence: EvidenceSet) -> bool {
        match self.index.get(key) {
            Some(&i) => {
                self.entries[i].evidence.extend(evidence);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredCandidate> {
        self.entries.iter()
    }

    /// Keys and candidates in insertion order, for handing out to workers.
    pub fn work_items(&self) -> Vec<(IdentityKey, Candidate)> {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), e.candidate.clone()))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<StoredCandidate> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Evidence, EvidenceSource};

    #[test]
    fn test_same_name_same_bucket_stored_once() {
        let mut store = CandidateStore::new();
        let a = Candidate::named("Tony's Pizza").with_location(40.68190, -73.99950);
        let b = Candidate::named("TONYS PIZZA")
            .with_location(40.68190, -73.99950)
            .with_website("https://tonys.example");

        assert!(store.upsert(a.clone()));
        assert!(!store.upsert(b));
        assert!(!store.upsert(a.clone()));
        assert_eq!(store.len(), 1);

        // First sighting wins.
        let key = IdentityKey::for_candidate(&a);
        assert!(store.get(&key).unwrap().candidate.website.is_none());
    }

    #[test]
    fn test_name_only_key_without_coordinates() {
        let c = Candidate::named("Tony's Pizza");
        assert_eq!(IdentityKey::for_candidate(&c).as_str(), "tonys pizza");
    }

    #[test]
    fn test_distant_branches_are_distinct() {
        let mut store = CandidateStore::new();
        assert!(store.upsert(Candidate::named("Joe's Pizza").with_location(40.7306, -73.9890)));
        assert!(store.upsert(Candidate::named("Joe's Pizza").with_location(40.7590, -73.9845)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut store = CandidateStore::new();
        for name in ["Charlie", "Alpha", "Bravo"] {
            store.upsert(Candidate::named(name));
        }
        let names: Vec<_> = store.iter().map(|e| e.candidate.name.as_str()).collect();
        assert_eq!(names, vec!["Charlie", "Alpha", "Bravo"]);
    }

    #[test]
    fn test_evidence_accumulates_as_a_set() {
        let mut store = CandidateStore::new();
        let c = Candidate::named("Tony's Pizza");
        let key = IdentityKey::for_candidate(&c);
        store.upsert(c);

        let hit = Evidence::new(EvidenceSource::Website, "sourdough");
        assert!(store.attach_evidence(&key, [hit.clone()].into()));
        assert!(store.attach_evidence(&key, [hit].into()));
        assert_eq!(store.get(&key).unwrap().evidence.len(), 1);

        let unknown = IdentityKey::for_candidate(&Candidate::named("Nowhere"));
        assert!(!store.attach_evidence(&unknown, EvidenceSet::new()));
    }
}
