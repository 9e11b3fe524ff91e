//! In-memory cache backend.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use clamflow_common::{SwError, SwResult};
use hashbrown::HashMap;

use crate::{CacheBackend, RequestKey, ResponseSnapshot};

/// A single namespace.
#[derive(Debug, Default)]
struct Namespace {
    entries: HashMap<RequestKey, ResponseSnapshot>,
}

/// Namespaces held in process memory. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> SwResult<RwLockReadGuard<'_, HashMap<String, Namespace>>> {
        self.namespaces
            .read()
            .map_err(|_| SwError::storage("memory backend lock poisoned"))
    }

    fn write(&self) -> SwResult<RwLockWriteGuard<'_, HashMap<String, Namespace>>> {
        self.namespaces
            .write()
            .map_err(|_| SwError::storage("memory backend lock poisoned"))
    }
}

impl CacheBackend for MemoryBackend {
    fn open(&self, name: &str) -> SwResult<()> {
        self.write()?.entry(name.to_string()).or_default();
        Ok(())
    }

    fn has(&self, name: &str) -> SwResult<bool> {
        Ok(self.read()?.contains_key(name))
    }

    fn names(&self) -> SwResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> SwResult<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    fn get(&self, name: &str, key: &RequestKey) -> SwResult<Option<ResponseSnapshot>> {
        Ok(self
            .read()?
            .get(name)
            .and_then(|ns| ns.entries.get(key))
            .cloned())
    }

    fn put(&self, name: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> SwResult<()> {
        self.write()?
            .entry(name.to_string())
            .or_default()
            .entries
            .insert(key.clone(), snapshot.clone());
        Ok(())
    }

    fn delete_entry(&self, name: &str, key: &RequestKey) -> SwResult<bool> {
        Ok(self
            .write()?
            .get_mut(name)
            .map(|ns| ns.entries.remove(key).is_some())
            .unwrap_or(false))
    }

    fn keys(&self, name: &str) -> SwResult<Vec<RequestKey>> {
        Ok(self
            .read()?
            .get(name)
            .map(|ns| ns.entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
