//! Persistence for analysis records.
//!
//! The store keeps a bounded, most-recent-first list of [`AnalysisRecord`]s:
//! saving a record for a source that was already analyzed replaces the old
//! record, and once the capacity is reached the oldest entry is evicted.
//! [`JsonStore`] mirrors that list into a JSON file so records survive
//! restarts; a failed file write is logged and swallowed, never surfaced as a
//! pipeline failure.

use crate::models::{AnalysisRecord, StoreStats};
use chrono::{Duration, Utc};
use itertools::Itertools;
use std::collections::VecDeque;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub type StoreError = Box<dyn Error + Send + Sync>;

/// Maximum number of records kept.
pub const DEFAULT_CAPACITY: usize = 50;

const RECORDS_FILE: &str = "records.json";

/// Capability surface the pipeline and CLI need from a record store.
pub trait RecordStore {
    /// Persist a record, assigning it an id. Replaces any existing record
    /// with the same source.
    async fn save(&self, record: AnalysisRecord) -> Result<AnalysisRecord, StoreError>;

    /// The most recently saved records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>, StoreError>;

    /// Delete everything, returning how many records were removed.
    async fn clear_all(&self) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

// Lets a shared handle be injected into the pipeline while the CLI keeps its
// own reference for the history/stats commands.
impl<S: RecordStore> RecordStore for std::sync::Arc<S> {
    async fn save(&self, record: AnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        (**self).save(record).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        (**self).recent(limit).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        (**self).find_by_url(url).await
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        (**self).clear_all().await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        (**self).stats().await
    }
}

/// JSON-file-backed store with a bounded in-memory index.
pub struct JsonStore {
    path: PathBuf,
    capacity: usize,
    records: Mutex<VecDeque<AnalysisRecord>>,
    next_id: AtomicU64,
}

impl JsonStore {
    /// Open (or create) a store under `dir` with the default capacity.
    pub async fn open(dir: &Path) -> Result<Self, StoreError> {
        Self::open_with_capacity(dir, DEFAULT_CAPACITY).await
    }

    #[instrument(level = "info", skip_all, fields(dir = %dir.display(), capacity))]
    pub async fn open_with_capacity(dir: &Path, capacity: usize) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(RECORDS_FILE);

        let mut records = VecDeque::new();
        match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Vec<AnalysisRecord>>(&raw) {
                Ok(loaded) => {
                    info!(count = loaded.len(), "Loaded existing records");
                    records.extend(loaded.into_iter().take(capacity));
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Records file unreadable; starting empty");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No records file yet");
            }
            Err(e) => return Err(e.into()),
        }

        let next_id = AtomicU64::new(records.len() as u64);
        Ok(Self {
            path,
            capacity,
            records: Mutex::new(records),
            next_id,
        })
    }

    /// Mirror the in-memory list to disk. Write failures keep the in-memory
    /// state authoritative.
    async fn persist(&self, records: &VecDeque<AnalysisRecord>) {
        let snapshot: Vec<&AnalysisRecord> = records.iter().collect();
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Could not serialize records; skipping write");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json).await {
            warn!(error = %e, path = %self.path.display(), "Failed to write records file; keeping in-memory state");
        }
    }
}

impl RecordStore for JsonStore {
    #[instrument(level = "info", skip_all, fields(source = %record.source))]
    async fn save(&self, mut record: AnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        let mut records = self.records.lock().await;

        records.retain(|r| r.source != record.source);
        if record.id.is_none() {
            record.id = Some(format!(
                "rec-{}",
                self.next_id.fetch_add(1, Ordering::SeqCst)
            ));
        }
        records.push_front(record.clone());
        records.truncate(self.capacity);

        self.persist(&records).await;
        info!(id = ?record.id, total = records.len(), "Saved analysis record");
        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().take(limit).cloned().collect())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| r.source == url).cloned())
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        let mut records = self.records.lock().await;
        let cleared = records.len();
        records.clear();
        self.persist(&records).await;
        info!(cleared, "Cleared stored records");
        Ok(cleared)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let records = self.records.lock().await;

        let total = records.len();
        let sentiment_distribution = records
            .iter()
            .map(|r| r.sentiment.as_str().to_string())
            .counts()
            .into_iter()
            .collect();
        let average_score = if total == 0 {
            0.0
        } else {
            records.iter().map(|r| r.score).sum::<f64>() / total as f64
        };
        let cutoff = Utc::now() - Duration::hours(24);
        let recent_analyses = records.iter().filter(|r| r.timestamp >= cutoff).count();

        Ok(StoreStats {
            total_analyses: total,
            sentiment_distribution,
            average_score,
            recent_analyses,
        })
    }
}
