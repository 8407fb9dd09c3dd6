//! Versioned weight store over a single JSON file.
//!
//! Writes go to a temp file in the same directory, get fsynced, then rename
//! over the live file, so a concurrent ranking run loads either the old or
//! the new config in full, never a torn one. Every save bumps the version
//! and appends a provenance line to a sibling history log. Same discipline
//! as an index flip: never expose a half-built artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use policydb_core::error::{Error, Result};
use policydb_core::types::WeightConfig;

/// Which feedback records caused a save; written to the history log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningProvenance {
    pub records: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryLine {
    version: u64,
    updated_at: DateTime<Utc>,
    records: Vec<String>,
}

pub struct WeightStore {
    path: PathBuf,
    history_path: PathBuf,
    // At most one tuning write in flight; readers never take this.
    write_lock: Mutex<()>,
}

impl WeightStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history_path = path.with_extension("history.jsonl");
        Self { path, history_path, write_lock: Mutex::new(()) }
    }

    /// Latest fully committed config. A missing file means the store was
    /// never tuned: built-in defaults at version 0. An unparseable file is
    /// fatal; ranking with guessed weights would be worse than refusing.
    pub fn load(&self) -> Result<WeightConfig> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::WeightStoreCorrupt(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(WeightConfig::defaults()),
            Err(e) => Err(Error::WeightStoreCorrupt(format!("{}: {}", self.path.display(), e))),
        }
    }

    /// Commit `config` as the next version and record its provenance.
    /// Returns the committed config (fresh version and timestamp).
    pub fn save(&self, config: &WeightConfig, provenance: &TuningProvenance) -> Result<WeightConfig> {
        let _guard = match self.write_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Version continuity comes from disk, not the caller's copy, so two
        // store handles cannot both mint the same version.
        let committed = self.load()?;
        let mut next = config.clone();
        next.version = committed.version + 1;
        next.updated_at = Utc::now();

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        serde_json::to_writer_pretty(&mut tmp, &next)
            .map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::WeightStoreWrite(e.to_string()))?;

        self.append_history(&next, provenance)?;
        info!(version = next.version, records = provenance.records.len(), "weight config committed");
        Ok(next)
    }

    fn append_history(&self, config: &WeightConfig, provenance: &TuningProvenance) -> Result<()> {
        let line = HistoryLine {
            version: config.version,
            updated_at: config.updated_at,
            records: provenance.records.clone(),
        };
        let mut payload =
            serde_json::to_string(&line).map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        payload.push('\n');
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        f.write_all(payload.as_bytes())
            .map_err(|e| Error::WeightStoreWrite(e.to_string()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
