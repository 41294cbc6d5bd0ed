//! Persisted per-domain alert history.
//!
//! The state file is a JSON object keyed by domain:
//!
//! ```json
//! {
//!   "example.com": {
//!     "last_notified_days": 3,
//!     "last_check": "2024-03-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! A missing or unreadable file loads as an empty mapping. Saving writes a
//! temporary file in the same directory and renames it over the target.
//!
//! `last_check` is written back exactly as it was read until the record is
//! touched again, so a file produced by another writer (`+00:00` offsets,
//! microseconds) survives a load and save unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::error::StateError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Days left when the last alert was delivered. `None` means no outstanding alert.
    #[serde(default)]
    pub last_notified_days: Option<i64>,
    /// Most recent successful probe.
    pub last_check: CheckTime,
}

/// An RFC 3339 instant that remembers the text it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTime {
    instant: DateTime<Utc>,
    text: String,
}

impl CheckTime {
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<DateTime<Utc>> for CheckTime {
    fn from(instant: DateTime<Utc>) -> Self {
        CheckTime {
            instant,
            text: instant.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl PartialEq<DateTime<Utc>> for CheckTime {
    fn eq(&self, other: &DateTime<Utc>) -> bool {
        self.instant == *other
    }
}

impl fmt::Display for CheckTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for CheckTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for CheckTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let instant = DateTime::parse_from_rfc3339(&text)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok(CheckTime { instant, text })
    }
}

pub type StateMap = BTreeMap<String, DomainRecord>;

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: StateMap,
}

impl StateStore {
    /// Opens the store at `path`, loading whatever is there.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = load(&path);
        StateStore { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &StateMap {
        &self.records
    }

    /// The days-left value of the outstanding alert for `domain`, if any.
    pub fn get(&self, domain: &str) -> Option<i64> {
        self.records
            .get(domain)
            .and_then(|record| record.last_notified_days)
    }

    /// Records a successful probe, creating the record on first sight.
    pub fn touch(&mut self, domain: &str, now: DateTime<Utc>) {
        self.records
            .entry(domain.to_string())
            .and_modify(|record| record.last_check = now.into())
            .or_insert_with(|| {
                debug!(domain, "new domain record");
                DomainRecord {
                    last_notified_days: None,
                    last_check: now.into(),
                }
            });
    }

    /// Records a delivered alert at `days_left`.
    pub fn update(&mut self, domain: &str, days_left: i64, now: DateTime<Utc>) {
        let record = self
            .records
            .entry(domain.to_string())
            .or_insert_with(|| DomainRecord {
                last_notified_days: None,
                last_check: now.into(),
            });
        record.last_notified_days = Some(days_left);
        record.last_check = now.into();
        info!(domain, days_left, "alert recorded");
    }

    /// Drops the outstanding alert for `domain`, keeping the record itself.
    pub fn clear(&mut self, domain: &str) {
        if let Some(record) = self.records.get_mut(domain) {
            if let Some(previous) = record.last_notified_days.take() {
                info!(domain, previous, "alert record cleared");
            }
        }
    }

    pub fn save(&self) -> Result<(), StateError> {
        save(&self.path, &self.records)
    }
}

/// Reads the mapping at `path`. Never fails: problems are logged and yield
/// an empty mapping, which discards all earlier alert history.
pub fn load(path: &Path) -> StateMap {
    match try_load(path) {
        Ok(records) => {
            debug!(path = %path.display(), domains = records.len(), "state loaded");
            records
        }
        Err(e) => {
            error!(error = %e, "state reset to empty");
            StateMap::new()
        }
    }
}

fn try_load(path: &Path) -> Result<StateMap, StateError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no state file yet");
            return Ok(StateMap::new());
        }
        Err(source) => {
            return Err(StateError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

/// Writes the full mapping to `path` through a temporary file and a rename.
pub fn save(path: &Path, records: &StateMap) -> Result<(), StateError> {
    let persist_error = |details: String| StateError::Persist {
        path: path.display().to_string(),
        details,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let json = serde_json::to_string_pretty(records).map_err(|e| persist_error(e.to_string()))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| persist_error(e.to_string()))?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| persist_error(e.to_string()))?;
    file.persist(path)
        .map_err(|e| persist_error(e.error.to_string()))?;

    info!(path = %path.display(), domains = records.len(), "state saved");
    Ok(())
}
