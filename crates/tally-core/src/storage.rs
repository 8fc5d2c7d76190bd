use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const TASKS_KEY: &str = "todo-tasks";
pub const THEME_KEY: &str = "todo-theme";

/// String-keyed, string-valued durable store.
///
/// A successful `write` must be visible to the next `read` of the same key.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).write(key, value)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).write(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    fail_writes: Cell<bool>,
    fail_reads: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Makes every subsequent `write` fail until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Makes every subsequent `read` fail until switched back off.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        if self.fail_reads.get() {
            return Err(anyhow!("memory store rejected read of {key}"));
        }
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.get() {
            return Err(anyhow!("memory store rejected write to {key}"));
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(file = %path.display(), bytes = raw.len(), "read key");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "key not present");
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)
            .with_context(|| format!("failed to stage write in {}", self.data_dir.display()))?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;

        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{FileStore, KeyValueStore, MemoryStore, TASKS_KEY, THEME_KEY};

    #[test]
    fn file_store_reads_back_latest_write() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");

        assert_eq!(store.read(THEME_KEY).expect("read"), None);

        store.write(THEME_KEY, "dark").expect("write");
        store.write(THEME_KEY, "light").expect("overwrite");

        assert_eq!(store.read(THEME_KEY).expect("read").as_deref(), Some("light"));
        assert!(store.path_for(THEME_KEY).ends_with("todo-theme.json"));
    }

    #[test]
    fn file_store_keys_are_independent() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(&temp.path().join("nested/dir")).expect("open store");

        store.write(TASKS_KEY, "[]").expect("write tasks");
        assert_eq!(store.read(THEME_KEY).expect("read theme"), None);
        assert_eq!(store.read(TASKS_KEY).expect("read tasks").as_deref(), Some("[]"));
    }

    #[test]
    fn memory_store_can_refuse_writes() {
        let store = MemoryStore::new().with_entry(THEME_KEY, "dark");
        store.set_fail_writes(true);

        assert!(store.write(THEME_KEY, "light").is_err());
        assert_eq!(store.read(THEME_KEY).expect("read").as_deref(), Some("dark"));

        store.set_fail_writes(false);
        store.write(THEME_KEY, "light").expect("write after recovery");
        assert_eq!(store.read(THEME_KEY).expect("read").as_deref(), Some("light"));
    }
}
