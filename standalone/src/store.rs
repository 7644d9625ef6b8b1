//! Transient key-value stores that hand partial results to the reduce tasks.
//!
//! A store is written once when it is created and then only read. It lives
//! until the last `Arc` to it is dropped, which the runner does after both
//! reduce stages are finished.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Error};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read side of a staged partial result set.
pub trait TransientStore: Send + Sync {
    /// Every key in the store, sorted.
    fn keys(&self) -> Vec<String>;

    /// The values staged under `key`, or `None` if the key is unknown.
    fn get(&self, key: &str) -> Result<Option<Vec<Value>>, Error>;
}

/// Where staged results are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    /// Keep staged results in memory.
    #[default]
    Memory,
    /// Write staged results to a temporary file that is removed on drop.
    Disk,
}

/// Stage `entries` in a new store of the given kind. Disk stores are created
/// in `dir`, or the system temp directory if `None`.
pub fn persist(
    kind: StoreKind,
    dir: Option<&Path>,
    entries: &BTreeMap<String, Vec<Value>>,
) -> Result<Arc<dyn TransientStore>, Error> {
    Ok(match kind {
        StoreKind::Memory => Arc::new(MemoryStore::from_entries(entries)),
        StoreKind::Disk => match dir {
            Some(dir) => Arc::new(DiskStore::from_entries_in(dir, entries)?),
            None => Arc::new(DiskStore::from_entries(entries)?),
        },
    })
}

/////////////////////////////////////////////////////////////////////////////
// Memory
/////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn from_entries(entries: &BTreeMap<String, Vec<Value>>) -> Self {
        let map = DashMap::with_capacity(entries.len());
        for (key, values) in entries {
            map.insert(key.clone(), values.clone());
        }
        Self { entries: map }
    }
}

impl TransientStore for MemoryStore {
    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn get(&self, key: &str) -> Result<Option<Vec<Value>>, Error> {
        Ok(self.entries.get(key).map(|values| values.value().clone()))
    }
}

/////////////////////////////////////////////////////////////////////////////
// Disk
/////////////////////////////////////////////////////////////////////////////

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    values: Vec<Value>,
}

/// One JSON record per line in a temporary file, plus an in-memory index of
/// line offsets.
#[derive(Debug)]
pub struct DiskStore {
    file: NamedTempFile,
    index: BTreeMap<String, u64>,
}

impl DiskStore {
    pub fn from_entries(entries: &BTreeMap<String, Vec<Value>>) -> Result<Self, Error> {
        let file = NamedTempFile::new().context("failed to create staging file")?;
        Self::write(file, entries)
    }

    pub fn from_entries_in(dir: &Path, entries: &BTreeMap<String, Vec<Value>>) -> Result<Self, Error> {
        let file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create staging file in {}", dir.display()))?;
        Self::write(file, entries)
    }

    fn write(file: NamedTempFile, entries: &BTreeMap<String, Vec<Value>>) -> Result<Self, Error> {
        let mut index = BTreeMap::new();

        {
            let mut writer = BufWriter::new(file.as_file());
            let mut offset = 0u64;
            for (key, values) in entries {
                let mut line = serde_json::to_vec(&Record {
                    key: key.clone(),
                    values: values.clone(),
                })?;
                line.push(b'\n');
                writer.write_all(&line)?;

                index.insert(key.clone(), offset);
                offset += line.len() as u64;
            }
            writer.flush()?;
        }

        debug!(path = %file.path().display(), keys = index.len(), "staged partial results");
        Ok(Self { file, index })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl TransientStore for DiskStore {
    fn keys(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<Value>>, Error> {
        let Some(&offset) = self.index.get(key) else {
            return Ok(None);
        };

        // Each reader opens its own handle so concurrent reads don't share
        // a cursor.
        let mut file = File::open(self.file.path())
            .with_context(|| format!("failed to open {}", self.file.path().display()))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut line = String::new();
        BufReader::new(file).read_line(&mut line)?;

        let record: Record = serde_json::from_str(&line)?;
        if record.key != key {
            return Err(anyhow!(
                "staging file is corrupt: expected key `{}`, found `{}`",
                key,
                record.key
            ));
        }
        Ok(Some(record.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries() -> BTreeMap<String, Vec<Value>> {
        BTreeMap::from([
            ("b".to_string(), vec![json!(2), json!({"nested": [1, 2]})]),
            ("a".to_string(), vec![json!("one")]),
            ("c\nd".to_string(), vec![]),
        ])
    }

    fn check(store: &dyn TransientStore) {
        assert_eq!(store.keys(), vec!["a", "b", "c\nd"]);
        assert_eq!(store.get("a").unwrap(), Some(vec![json!("one")]));
        assert_eq!(
            store.get("b").unwrap(),
            Some(vec![json!(2), json!({"nested": [1, 2]})])
        );
        assert_eq!(store.get("c\nd").unwrap(), Some(vec![]));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_store_serves_staged_entries() {
        check(&MemoryStore::from_entries(&entries()));
    }

    #[test]
    fn disk_store_serves_staged_entries() {
        check(&DiskStore::from_entries(&entries()).unwrap());
    }

    #[test]
    fn disk_store_removes_its_file_on_drop() {
        let store = DiskStore::from_entries(&entries()).unwrap();
        let path = store.path().to_path_buf();
        assert!(path.exists());

        drop(store);
        assert!(!path.exists());
    }

    #[test]
    fn persist_picks_the_requested_backend() {
        for kind in [StoreKind::Memory, StoreKind::Disk] {
            let store = persist(kind, None, &entries()).unwrap();
            check(store.as_ref());
        }
    }

    #[test]
    fn disk_store_can_live_in_a_chosen_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = persist(StoreKind::Disk, Some(dir.path()), &entries()).unwrap();
        check(store.as_ref());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        drop(store);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
