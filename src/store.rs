use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Default location of the persisted match set, relative to the working
/// directory.
pub const SEEN_MATCHES_FILE: &str = "data/seen_matches.json";

/// Normalized signature of a matched line: lowercased, with runs of
/// whitespace collapsed to single spaces. Lines that differ only in casing
/// or spacing share a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(line: &str) -> Self {
        let normalized = line
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Fingerprint(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Durable set of fingerprints already notified about, backed by a JSON
/// file holding an unordered list of fingerprint strings.
#[derive(Debug)]
pub struct MatchStore {
    path: PathBuf,
    seen: HashSet<Fingerprint>,
}

impl MatchStore {
    /// Load the persisted match set. A missing record starts an empty set
    /// and writes the initial file; an unreadable or malformed record is
    /// logged and degrades to an empty set so monitoring can continue.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let seen = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<Fingerprint>>(&raw) {
                Ok(list) => {
                    debug!("loaded {} seen matches from {}", list.len(), path.display());
                    list.into_iter().collect()
                }
                Err(e) => {
                    warn!(
                        "malformed match record at {}, starting with an empty set: {e}",
                        path.display()
                    );
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let store = Self {
                    path,
                    seen: HashSet::new(),
                };
                store.persist(); // create the initial record
                return store;
            }
            Err(e) => {
                warn!(
                    "could not read match record at {}, starting with an empty set: {e}",
                    path.display()
                );
                HashSet::new()
            }
        };

        Self { path, seen }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Insert into the in-memory set only; call `persist` to write through.
    pub fn add(&mut self, fingerprint: Fingerprint) {
        self.seen.insert(fingerprint);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Overwrite the record with the full current set. A failed write is
    /// logged but never propagated: stale persistence costs duplicate
    /// notifications later, not the monitoring loop.
    pub fn persist(&self) {
        if let Err(e) = self.try_persist() {
            error!("failed to persist match set to {}: {e}", self.path.display());
        }
    }

    fn try_persist(&self) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let list: Vec<&Fingerprint> = self.seen.iter().collect();
        let data = serde_json::to_vec(&list)?;

        // Write-then-rename so a reader never sees a partial record.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
