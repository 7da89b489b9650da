//! Verified-record persistence, keyed by normalized business name.
//!
//! `JsonFileGateway` keeps the whole table in memory and rewrites the file on
//! every upsert (write to `{path}.tmp`, then rename) so readers never observe
//! a partial file.

use crate::core::text::normalize_name;
use crate::types::VerifiedRecord;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
}

/// Idempotent upsert store for final records.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool, PersistError>;

    /// Insert or replace the record stored under the record's name.
    async fn upsert(&self, record: &VerifiedRecord) -> Result<(), PersistError>;
}

/// Storage key for a business name.
pub fn record_key(name: &str) -> String {
    normalize_name(name)
}

/// `~/.sourdough-scout/records.json`
pub fn default_store_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".sourdough-scout").join("records.json"))
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    records: RwLock<HashMap<String, VerifiedRecord>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn get(&self, name: &str) -> Option<VerifiedRecord> {
        self.records.read().await.get(&record_key(name)).cloned()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn exists(&self, name: &str) -> Result<bool, PersistError> {
        Ok(self.records.read().await.contains_key(&record_key(name)))
    }

    async fn upsert(&self, record: &VerifiedRecord) -> Result<(), PersistError> {
        self.records
            .write()
            .await
            .insert(record_key(&record.candidate.name), record.clone());
        Ok(())
    }
}

pub struct JsonFileGateway {
    path: PathBuf,
    records: Mutex<BTreeMap<String, VerifiedRecord>>,
}

impl JsonFileGateway {
    /// Load the table at `path`. A missing file is an empty table; an
    /// unparseable one is an error rather than something to overwrite.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str::<BTreeMap<String, VerifiedRecord>>(&contents)
                .map_err(|e| PersistError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), records = records.len(), "record store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    async fn save(&self, records: &BTreeMap<String, VerifiedRecord>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), records = records.len(), "record store saved");
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileGateway {
    async fn exists(&self, name: &str) -> Result<bool, PersistError> {
        Ok(self.records.lock().await.contains_key(&record_key(name)))
    }

    async fn upsert(&self, record: &VerifiedRecord) -> Result<(), PersistError> {
        // Held across the write so concurrent upserts serialize.
        let mut records = self.records.lock().await;
        records.insert(record_key(&record.candidate.name), record.clone());
        self.save(&records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, ConfidenceTier, Evidence, EvidenceSource};
    use chrono::Utc;

    fn record(name: &str) -> VerifiedRecord {
        let evidence: crate::types::EvidenceSet =
            [Evidence::new(EvidenceSource::Website, "sourdough")].into();
        VerifiedRecord {
            candidate: Candidate::named(name).with_location(40.6819, -73.9995),
            keywords: ["sourdough".to_string()].into(),
            sources: [EvidenceSource::Website].into(),
            confidence: ConfidenceTier::Low,
            evidence,
            support: 1.0,
            sightings: 1,
            verified_at: Utc::now(),
        }
    }

    #[test]
    fn test_memory_gateway_keys_by_normalized_name() {
        tokio_test::block_on(async {
            let gw = MemoryGateway::new();
            gw.upsert(&record("Tony's Pizza")).await.unwrap();
            gw.upsert(&record("TONYS PIZZA")).await.unwrap();

            assert_eq!(gw.len().await, 1);
            assert!(gw.exists("tonys pizza").await.unwrap());
            assert!(!gw.exists("Lucali").await.unwrap());
        });
    }

    #[tokio::test]
    async fn test_json_gateway_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.json");

        let gw = JsonFileGateway::open(&path).await.unwrap();
        assert_eq!(gw.len().await, 0);
        gw.upsert(&record("Tony's Pizza")).await.unwrap();
        gw.upsert(&record("Lucali")).await.unwrap();
        assert!(!path.with_extension("tmp").exists());

        let reopened = JsonFileGateway::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(reopened.exists("Tony's Pizza").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        match JsonFileGateway::open(&path).await {
            Err(PersistError::Corrupt { .. }) => {}
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("corrupt store opened"),
        }
    }
}
