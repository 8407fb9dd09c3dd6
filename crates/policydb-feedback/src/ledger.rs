//! Append-only feedback ledger, one JSON record per line.
//!
//! Each append is a single `O_APPEND` write, so concurrent writers interleave
//! whole lines and a failed append never touches records already on disk.
//! Each line deserializes independently: a corrupt trailing record is skipped
//! with a warning and never invalidates prior ones.

use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use policydb_core::error::{Error, Result};
use policydb_core::traits::Ledger;
use policydb_core::types::FeedbackRecord;

pub struct FeedbackLedger {
    path: PathBuf,
}

impl FeedbackLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record. Duplicate content is legitimate (repeated queries);
    /// failure surfaces to the caller, whose ranking run is already complete.
    pub fn append(&self, record: &FeedbackRecord) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::LedgerWrite(e.to_string()))?;
        }
        let mut line =
            serde_json::to_string(record).map_err(|e| Error::LedgerWrite(e.to_string()))?;
        line.push('\n');
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::LedgerWrite(e.to_string()))?;
        f.write_all(line.as_bytes()).map_err(|e| Error::LedgerWrite(e.to_string()))?;
        f.flush().map_err(|e| Error::LedgerWrite(e.to_string()))?;
        Ok(())
    }

    /// The last `n` records in insertion order.
    pub fn read_recent(&self, n: usize) -> Result<Vec<FeedbackRecord>> {
        let mut records = self.read_all()?;
        if records.len() > n {
            records.drain(..records.len() - n);
        }
        Ok(records)
    }

    /// All records at or after `since`, in insertion order.
    pub fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<FeedbackRecord>> {
        let records = self.read_all()?;
        Ok(records.into_iter().filter(|r| r.timestamp >= since).collect())
    }

    fn read_all(&self) -> Result<Vec<FeedbackRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::LedgerRead(e.to_string())),
        };
        let mut records = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackRecord>(line) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping malformed ledger line");
                }
            }
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Ledger for FeedbackLedger {
    fn append(&self, record: &FeedbackRecord) -> Result<()> {
        FeedbackLedger::append(self, record)
    }
    fn read_recent(&self, n: usize) -> Result<Vec<FeedbackRecord>> {
        FeedbackLedger::read_recent(self, n)
    }
    fn read_since(&self, since: DateTime<Utc>) -> Result<Vec<FeedbackRecord>> {
        FeedbackLedger::read_since(self, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(query: &str, quality: f64) -> FeedbackRecord {
        FeedbackRecord::new(query, vec![], quality, 1)
    }

    #[test]
    fn appends_preserve_insertion_order() {
        let tmp = TempDir::new().expect("tempdir");
        let ledger = FeedbackLedger::new(tmp.path().join("feedback.jsonl"));
        ledger.append(&record("first", 40.0)).expect("append");
        ledger.append(&record("second", 55.0)).expect("append");
        ledger.append(&record("third", 70.0)).expect("append");

        let recent = ledger.read_recent(2).expect("read");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query_text, "second");
        assert_eq!(recent[1].query_text, "third");
    }

    #[test]
    fn corrupt_trailing_line_does_not_invalidate_prior_records() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("feedback.jsonl");
        let ledger = FeedbackLedger::new(&path);
        ledger.append(&record("intact", 62.0)).expect("append");

        // Simulate a crash mid-append.
        let mut f = fs::OpenOptions::new().append(true).open(&path).expect("open");
        f.write_all(b"{\"record_id\":\"trunc").expect("write");
        drop(f);

        let records = ledger.read_recent(10).expect("read");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query_text, "intact");

        // And appending afterwards still works.
        ledger.append(&record("after", 80.0)).expect("append");
        assert_eq!(ledger.read_recent(10).expect("read").len(), 2);
    }

    #[test]
    fn duplicate_content_is_legitimate() {
        let tmp = TempDir::new().expect("tempdir");
        let ledger = FeedbackLedger::new(tmp.path().join("feedback.jsonl"));
        ledger.append(&record("same query", 50.0)).expect("append");
        ledger.append(&record("same query", 50.0)).expect("append");
        assert_eq!(ledger.read_recent(10).expect("read").len(), 2);
    }

    #[test]
    fn read_since_filters_by_timestamp() {
        let tmp = TempDir::new().expect("tempdir");
        let ledger = FeedbackLedger::new(tmp.path().join("feedback.jsonl"));
        let mut early = record("early", 40.0);
        early.timestamp -= chrono::Duration::minutes(10);
        ledger.append(&early).expect("append");
        let late = record("late", 70.0);
        ledger.append(&late).expect("append");

        let since = ledger.read_since(late.timestamp - chrono::Duration::minutes(5)).expect("read");
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].query_text, "late");
    }

    #[test]
    fn missing_file_reads_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let ledger = FeedbackLedger::new(tmp.path().join("never_written.jsonl"));
        assert!(ledger.read_recent(5).expect("read").is_empty());
    }
}
