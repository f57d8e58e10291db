//! Persisted pattern collection
//!
//! A JSON file of named patterns the user can start as tracks:
//!
//! ```json
//! {
//!   "version": 1,
//!   "patterns": [
//!     { "id": "kick", "fragment": "s(\"bd*4\")", "display_name": "Kick",
//!       "color": "#ff5500", "base_tempo": 120.0 }
//!   ]
//! }
//! ```

use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_VERSION: u32 = 1;

/// A stored pattern
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: String,
    pub fragment: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    /// Base tempo in BPM (four beats per cycle)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_tempo: Option<f64>,
    /// Sample to preload before the pattern is played
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_url: Option<String>,
}

impl PatternRecord {
    pub fn new(id: &str, fragment: &str) -> Self {
        Self {
            id: id.to_string(),
            fragment: fragment.to_string(),
            display_name: id.to_string(),
            description: String::new(),
            color: String::new(),
            base_tempo: None,
            sample_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    version: u32,
    #[serde(default)]
    patterns: Vec<PatternRecord>,
}

/// File-backed list of pattern records, keyed by id
#[derive(Debug, Clone)]
pub struct PatternCollection {
    path: PathBuf,
    records: Vec<PatternRecord>,
}

impl PatternCollection {
    /// Load from `path`; a missing file is an empty collection
    pub fn load(path: &Path) -> SessionResult<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let file: CollectionFile = serde_json::from_str(&content).map_err(|e| {
                SessionError::Collection(format!("cannot parse {}: {}", path.display(), e))
            })?;
            if file.version > FILE_VERSION {
                return Err(SessionError::Collection(format!(
                    "{} has version {}, newest supported is {}",
                    path.display(),
                    file.version,
                    FILE_VERSION
                )));
            }
            file.patterns
        } else {
            debug!("No collection at {}, starting empty", path.display());
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Write the collection back to its file
    pub fn save(&self) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = CollectionFile {
            version: FILE_VERSION,
            patterns: self.records.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        info!("Saved {} patterns to {}", self.records.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &[PatternRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&PatternRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Look up a record or fail with a collection error
    pub fn require(&self, id: &str) -> SessionResult<&PatternRecord> {
        self.get(id)
            .ok_or_else(|| SessionError::Collection(format!("no pattern with id {}", id)))
    }

    /// Add a record, replacing any record with the same id in place
    pub fn add(&mut self, record: PatternRecord) -> SessionResult<()> {
        if record.id.trim().is_empty() || record.fragment.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "pattern needs an id and a fragment".to_string(),
            ));
        }
        if let Some(tempo) = record.base_tempo {
            if !tempo.is_finite() || tempo <= 0.0 {
                return Err(SessionError::InvalidInput(format!(
                    "base tempo must be positive, got {}",
                    tempo
                )));
            }
        }

        match self.records.iter().position(|r| r.id == record.id) {
            Some(index) => self.records[index] = record,
            None => self.records.push(record),
        }
        Ok(())
    }

    /// Remove by id; returns whether anything was removed
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let collection = PatternCollection::load(&dir.path().join("none.json")).unwrap();
        assert!(collection.list().is_empty());
    }

    #[test]
    fn test_add_save_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("patterns.json");

        let mut collection = PatternCollection::load(&path).unwrap();
        let mut kick = PatternRecord::new("kick", "s(\"bd*4\")");
        kick.base_tempo = Some(120.0);
        collection.add(kick).unwrap();
        collection.add(PatternRecord::new("hats", "s(\"hh*8\")")).unwrap();
        collection.add(PatternRecord::new("kick", "s(\"bd*2\")")).unwrap();
        collection.save().unwrap();

        let reloaded = PatternCollection::load(&path).unwrap();
        let ids: Vec<&str> = reloaded.list().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["kick", "hats"]);
        assert_eq!(reloaded.require("kick").unwrap().fragment, "s(\"bd*2\")");
        assert_eq!(reloaded.require("kick").unwrap().base_tempo, None);
    }

    #[test]
    fn test_remove_and_validation() {
        let dir = tempdir().unwrap();
        let mut collection = PatternCollection::load(&dir.path().join("p.json")).unwrap();
        collection.add(PatternRecord::new("a", "s(\"bd\")")).unwrap();

        assert!(collection.remove("a"));
        assert!(!collection.remove("a"));
        assert!(collection.add(PatternRecord::new("", "s(\"bd\")")).is_err());

        let mut bad = PatternRecord::new("b", "s(\"bd\")");
        bad.base_tempo = Some(-1.0);
        assert!(collection.add(bad).is_err());
        assert!(collection.require("a").is_err());
    }

    #[test]
    fn test_minimal_records_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"version":1,"patterns":[{"id":"x","fragment":"s(\"cp\")","sample_url":"https://example.com/cp.wav"}]}"#,
        )
        .unwrap();

        let collection = PatternCollection::load(&path).unwrap();
        let record = collection.require("x").unwrap();
        assert_eq!(record.display_name, "");
        assert_eq!(record.sample_url.as_deref(), Some("https://example.com/cp.wav"));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, r#"{"version":99,"patterns":[]}"#).unwrap();
        assert!(PatternCollection::load(&path).is_err());
    }
}
