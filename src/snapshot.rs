//! Latest snapshot held in memory, backed by the CSV files in [`crate::output`].

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::output::{append_records, read_records, write_snapshot};
use crate::record::NormalizedRecord;
use crate::summary::Summary;

/// Records of one update cycle, ordered by advertised time.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub records: Vec<NormalizedRecord>,
    pub last_updated: Option<NaiveDateTime>,
}

impl Snapshot {
    /// Sorts `records` by advertised time. Records without one sort first; ties
    /// keep their fetch order.
    pub fn new(mut records: Vec<NormalizedRecord>, last_updated: Option<NaiveDateTime>) -> Self {
        records.sort_by_key(|r| r.advertised_time);
        Self {
            records,
            last_updated,
        }
    }

    pub fn significant(&self) -> impl Iterator<Item = &NormalizedRecord> {
        self.records.iter().filter(|r| r.is_significant())
    }

    /// First record advertised under `train_ident`.
    pub fn find_train(&self, train_ident: &str) -> Option<&NormalizedRecord> {
        self.records
            .iter()
            .find(|r| r.advertised_train_ident == train_ident)
    }

    pub fn summary(&self) -> Summary {
        Summary::from_records(&self.records, self.last_updated)
    }
}

pub struct SnapshotStore {
    snapshot_path: PathBuf,
    history_path: PathBuf,
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Opens the store, seeding it from a snapshot file left by a previous run.
    pub fn open(snapshot_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();
        let history_path = history_path.into();

        let snapshot = match read_records(&snapshot_path) {
            Ok(records) => {
                let last_updated = records.iter().map(|r| r.last_updated).max();
                info!(path = %snapshot_path.display(), rows = records.len(), "Loaded previous snapshot");
                Snapshot::new(records, last_updated)
            }
            Err(e) => {
                warn!(path = %snapshot_path.display(), error = %e, "Ignoring unreadable snapshot file");
                Snapshot::default()
            }
        };

        Self {
            snapshot_path,
            history_path,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persists `snapshot` and then makes it the current one. If the write
    /// fails, the previous snapshot stays current.
    pub fn replace(&self, snapshot: Snapshot) -> Result<()> {
        write_snapshot(&self.snapshot_path, &snapshot.records)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        Ok(())
    }

    pub fn append_history(&self, records: &[NormalizedRecord]) -> Result<()> {
        append_records(&self.history_path, records)
    }
}
