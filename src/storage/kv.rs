use anyhow::{bail, Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;

const LOCAL_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_storage");

/// Durable key-value store in a single redb file.
pub struct RedbKvStore {
    db: Database,
}

impl RedbKvStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let db = Database::create(path).context("Failed to open local database")?;
        // Ensure table exists
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(LOCAL_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Open `<data_dir>/local.redb`, defaulting to the platform data directory.
    pub fn open_default(data_dir: Option<&Path>) -> Result<Self> {
        let path = Self::db_path(data_dir)?;
        Self::open(&path)
    }

    pub fn db_path(data_dir: Option<&Path>) -> Result<PathBuf> {
        let dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::data_dir()
                .context("Failed to get data directory")?
                .join("audiobook"),
        };
        Ok(dir.join("local.redb"))
    }
}

impl KeyValueStore for RedbKvStore {
    fn backend_name(&self) -> &str {
        "redb"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(LOCAL_TABLE)?;
        let value = table.get(key)?.map(|v| v.value().to_string());
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(LOCAL_TABLE)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(LOCAL_TABLE)?;
            table.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }
}

/// In-process key-value store with an optional byte quota.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the total size of keys and values over `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(bytes),
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;

        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                bail!("quota exceeded: {} of {} bytes", needed, quota);
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        entries.remove(key);
        Ok(())
    }
}
