//! Persisted module ids.
//!
//! A records file is a JSON object mapping module names to numeric ids. It
//! keeps ids stable across invocations so rebuilt bundles only change where
//! their sources did.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Records {
    ids: BTreeMap<String, u32>,
}

impl Records {
    /// Read a records file.
    ///
    /// A missing file yields empty records. An unreadable or corrupt file
    /// also yields empty records, plus a message describing the problem.
    pub fn load(path: &Path) -> (Self, Option<String>) {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => (records, None),
                Err(err) => (
                    Self::default(),
                    Some(format!(
                        "ignoring corrupt records file {}: {err}",
                        path.display()
                    )),
                ),
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => (Self::default(), None),
            Err(err) => (
                Self::default(),
                Some(format!("cannot read records file {}: {err}", path.display())),
            ),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    /// The id recorded for `name`, assigning the next free one if needed.
    pub fn id_for(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let next = self.ids.values().max().map_or(0, |max| max + 1);
        self.ids.insert(name.to_string(), next);
        next
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
