use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ExplorerError, Result};

/// Durable key/value records, one JSON file per key.
///
/// Reads treat missing or corrupt data as absent. Writes go through a
/// temporary file and a rename so an interrupted write never leaves a
/// half-written record behind.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ExplorerError::Persistence(format!(
                    "read {}: {err}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| ExplorerError::Persistence(format!("decode {}: {err}", path.display())))
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            ExplorerError::Persistence(format!("create {}: {err}", self.dir.display()))
        })?;
        let path = self.path_for(key);
        let text = serde_json::to_string_pretty(value)
            .map_err(|err| ExplorerError::Persistence(format!("encode {key}: {err}")))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|err| {
            ExplorerError::Persistence(format!("create temp file in {}: {err}", self.dir.display()))
        })?;
        tmp.write_all(text.as_bytes())
            .map_err(|err| ExplorerError::Persistence(format!("write {key}: {err}")))?;
        tmp.persist(&path)
            .map(|_| ())
            .map_err(|err| ExplorerError::Persistence(format!("persist {}: {}", path.display(), err.error)))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ExplorerError::Persistence(format!(
                "remove {}: {err}",
                path.display()
            ))),
        }
    }
}

/// Loads a list record, treating every failure as an empty list.
pub fn load_list_or_empty<T: DeserializeOwned>(store: &LocalStore, key: &str) -> Vec<T> {
    match store.load::<Vec<T>>(key) {
        Ok(Some(items)) => items,
        Ok(None) => Vec::new(),
        Err(err) => {
            log::warn!("ignoring stored {key}: {err}");
            Vec::new()
        }
    }
}

/// Saves a record, logging instead of failing.
pub fn save_best_effort<T: Serialize>(store: &LocalStore, key: &str, value: &T) {
    if let Err(err) = store.save(key, value) {
        log::warn!("could not persist {key}: {err}");
    }
}
