//! Top-score ledger and its persistent store.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the score store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt score file: {0}")]
    Format(#[from] serde_json::Error),
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopScore {
    pub name: String,
    pub score: u64,
}

impl TopScore {
    pub fn new(name: impl Into<String>, score: u64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Where the ledger lives between process runs.
pub trait ScoreStore: Send + Sync {
    fn load(&self) -> Result<Vec<TopScore>, StoreError>;

    /// Replace the stored ledger wholesale.
    fn save(&self, entries: &[TopScore]) -> Result<(), StoreError>;
}

/// JSON file store. Saves go to a sibling temporary file that is then
/// renamed over the target, so a crash mid-write leaves the old file intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ScoreStore for JsonFileStore {
    fn load(&self) -> Result<Vec<TopScore>, StoreError> {
        if !self.path.exists() {
            info!("No score file at {:?}, starting with an empty ledger", self.path);
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, entries: &[TopScore]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            file.write_all(&json).map_err(|e| self.io_err(e))?;
            file.sync_all().map_err(|e| self.io_err(e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        debug!("Stored {} top scores to {:?}", entries.len(), self.path);
        Ok(())
    }
}

/// Store kept in memory, for tests and for running without a score file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<TopScore>>,
}

impl MemoryStore {
    pub fn snapshot(&self) -> Vec<TopScore> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ScoreStore for MemoryStore {
    fn load(&self) -> Result<Vec<TopScore>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, entries: &[TopScore]) -> Result<(), StoreError> {
        if let Ok(mut stored) = self.entries.lock() {
            *stored = entries.to_vec();
        }
        Ok(())
    }
}

/// Bounded list of best scores, highest first, one line per name.
#[derive(Debug, Clone)]
pub struct ScoreLedger {
    entries: Vec<TopScore>,
    max_len: usize,
}

impl ScoreLedger {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_len,
        }
    }

    /// Build from stored entries, restoring ordering and the length cap.
    pub fn from_entries(entries: Vec<TopScore>, max_len: usize) -> Self {
        let mut ledger = Self::new(max_len);
        for entry in entries {
            ledger.record(&entry.name, entry.score);
        }
        ledger
    }

    pub fn entries(&self) -> &[TopScore] {
        &self.entries
    }

    /// Merge a finished game's score. Returns `true` if the ledger changed.
    ///
    /// Zero scores are ignored, and an existing line for `name` is only
    /// replaced when strictly beaten. Equal scores keep insertion order.
    pub fn record(&mut self, name: &str, score: u64) -> bool {
        if score == 0 {
            return false;
        }
        if let Some(pos) = self.entries.iter().position(|e| e.name == name) {
            if score <= self.entries[pos].score {
                return false;
            }
            self.entries[pos].score = score;
        } else {
            self.entries.push(TopScore::new(name, score));
        }
        // Stable: earlier lines win ties.
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        let before = self.entries.len();
        self.entries.truncate(self.max_len);
        // A new line that fell straight off the end changed nothing.
        before <= self.max_len || self.entries.iter().any(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ledger: &ScoreLedger) -> Vec<&str> {
        ledger.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_sorted_and_capped() {
        let mut ledger = ScoreLedger::new(3);
        for (name, score) in [("a", 10), ("b", 30), ("c", 20), ("d", 40), ("e", 5)] {
            ledger.record(name, score);
        }
        assert_eq!(names(&ledger), vec!["d", "b", "c"]);
        assert!(ledger.entries().windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_only_strict_improvement_replaces() {
        let mut ledger = ScoreLedger::new(5);
        assert!(ledger.record("a", 10));
        assert!(!ledger.record("a", 10));
        assert!(!ledger.record("a", 3));
        assert!(ledger.record("a", 11));
        assert_eq!(ledger.entries(), &[TopScore::new("a", 11)]);
    }

    #[test]
    fn test_ties_keep_first_writer_ahead() {
        let mut ledger = ScoreLedger::new(5);
        ledger.record("first", 50);
        ledger.record("second", 50);
        assert_eq!(names(&ledger), vec!["first", "second"]);
    }

    #[test]
    fn test_zero_score_ignored() {
        let mut ledger = ScoreLedger::new(5);
        assert!(!ledger.record("a", 0));
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn test_entry_below_cap_reports_unchanged() {
        let mut ledger = ScoreLedger::new(1);
        ledger.record("a", 100);
        assert!(!ledger.record("b", 1));
        assert_eq!(names(&ledger), vec!["a"]);
    }

    #[test]
    fn test_from_entries_restores_order() {
        let stored = vec![TopScore::new("a", 1), TopScore::new("b", 9), TopScore::new("c", 5)];
        let ledger = ScoreLedger::from_entries(stored, 2);
        assert_eq!(names(&ledger), vec!["b", "c"]);
    }

    #[test]
    fn test_file_store_roundtrip_replaces_atomically() {
        let dir = std::env::temp_dir().join(format!("snakepit-ledger-{}", std::process::id()));
        let store = JsonFileStore::new(dir.join("top_scores.json"));
        assert!(store.load().unwrap().is_empty());

        store.save(&[TopScore::new("a", 7)]).unwrap();
        store.save(&[TopScore::new("b", 9), TopScore::new("a", 7)]).unwrap();
        assert_eq!(
            store.load().unwrap(),
            vec![TopScore::new("b", 9), TopScore::new("a", 7)]
        );
        assert!(!store.path().with_extension("tmp").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
