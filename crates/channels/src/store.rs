use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    fd_lock::RwLock,
    mqttgram_common::SubscriberId,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// One change to the subscriber list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Add(SubscriberId),
    Remove(SubscriberId),
    /// Add only when the list is empty.
    Seed(SubscriberId),
}

impl Mutation {
    /// Apply to `ids`, returning whether anything changed.
    pub fn apply(self, ids: &mut Vec<SubscriberId>) -> bool {
        match self {
            Self::Add(id) if !ids.contains(&id) => {
                ids.push(id);
                true
            },
            Self::Seed(id) if ids.is_empty() => {
                ids.push(id);
                true
            },
            Self::Add(_) | Self::Seed(_) => false,
            Self::Remove(id) => match ids.iter().position(|existing| *existing == id) {
                Some(pos) => {
                    ids.remove(pos);
                    true
                },
                None => false,
            },
        }
    }
}

/// Drop repeated ids, keeping the first occurrence.
pub(crate) fn dedup(raw: Vec<SubscriberId>) -> Vec<SubscriberId> {
    let mut ids = Vec::with_capacity(raw.len());
    for id in raw {
        if ids.contains(&id) {
            warn!(chat_id = %id, "duplicate subscriber in store, ignoring");
        } else {
            ids.push(id);
        }
    }
    ids
}

/// Durable storage for the subscriber list.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Load the persisted list in insertion order. A missing list is empty.
    async fn load(&self) -> Result<Vec<SubscriberId>>;

    /// Replace the persisted list. Must be durable when it returns `Ok`.
    async fn save(&self, ids: &[SubscriberId]) -> Result<()>;

    /// Apply `mutation` to the persisted list and return the list as now
    /// stored, plus whether it changed.
    ///
    /// Stores shared between processes override this to read, change and
    /// write under one lock, so concurrent writers never drop each other's
    /// changes.
    async fn update(&self, mutation: Mutation) -> Result<(Vec<SubscriberId>, bool)> {
        let mut ids = dedup(self.load().await?);
        let changed = mutation.apply(&mut ids);
        if changed {
            self.save(&ids).await?;
        }
        Ok((ids, changed))
    }
}

/// Subscriber list stored as a JSON array of chat ids.
///
/// Writes go to a sibling temp file which is synced and then renamed over
/// the target, so a crash leaves either the old or the new list. Every
/// write holds an exclusive `fd-lock` on `<file>.lock`, which serializes
/// the running bridge and offline `subscribers` commands on the same file.
#[derive(Debug, Clone)]
pub struct JsonFileSubscriberStore {
    path: PathBuf,
}

impl JsonFileSubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on the stored list while holding the file lock. When `f`
    /// returns a list, it replaces the stored one before the lock is
    /// released.
    async fn locked<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<SubscriberId>) -> (Option<Vec<SubscriberId>>, T) + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || locked_blocking(&path, f))
            .await
            .map_err(|e| Error::persistence("subscriber store task failed", e))?
    }
}

#[async_trait]
impl SubscriberStore for JsonFileSubscriberStore {
    async fn load(&self) -> Result<Vec<SubscriberId>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => parse_ids(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "subscriber file not found, starting empty");
                Ok(Vec::new())
            },
            Err(e) => Err(Error::persistence(
                format!("reading {}", self.path.display()),
                e,
            )),
        }
    }

    async fn save(&self, ids: &[SubscriberId]) -> Result<()> {
        let ids = ids.to_vec();
        self.locked(move |_| (Some(ids), ())).await
    }

    async fn update(&self, mutation: Mutation) -> Result<(Vec<SubscriberId>, bool)> {
        self.locked(move |current| {
            let mut ids = dedup(current);
            let changed = mutation.apply(&mut ids);
            (changed.then(|| ids.clone()), (ids, changed))
        })
        .await
    }
}

fn locked_blocking<T>(
    path: &Path,
    f: impl FnOnce(Vec<SubscriberId>) -> (Option<Vec<SubscriberId>>, T),
) -> Result<T> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::persistence(format!("creating directory for {}", path.display()), e)
        })?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))
        .map_err(|e| Error::persistence(format!("opening lock for {}", path.display()), e))?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock
        .write()
        .map_err(|e| Error::persistence(format!("locking {}", path.display()), e))?;

    let current = match std::fs::read_to_string(path) {
        Ok(data) => parse_ids(&data)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(Error::persistence(format!("reading {}", path.display()), e)),
    };

    let (replacement, out) = f(current);
    if let Some(ids) = replacement {
        write_ids(path, &ids)?;
    }
    Ok(out)
}

fn write_ids(path: &Path, ids: &[SubscriberId]) -> Result<()> {
    let data = serde_json::to_string_pretty(ids)?;
    let tmp = path.with_extension("json.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|e| Error::persistence(format!("writing {}", path.display()), e))?;

    debug!(path = %path.display(), count = ids.len(), "subscriber list saved");
    Ok(())
}

fn parse_ids(data: &str) -> Result<Vec<SubscriberId>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(data)?)
}

/// `subscribers.json` -> `subscribers.json.lock`
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("subscribers"));
    name.push(".lock");
    path.with_file_name(name)
}

/// In-memory store, for tests and for running without a data directory.
#[derive(Debug, Default)]
pub struct MemorySubscriberStore {
    ids: Mutex<Vec<SubscriberId>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: impl IntoIterator<Item = SubscriberId>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
        }
    }

    /// What the last `save` wrote.
    pub fn snapshot(&self) -> Vec<SubscriberId> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn load(&self) -> Result<Vec<SubscriberId>> {
        Ok(self.snapshot())
    }

    async fn save(&self, ids: &[SubscriberId]) -> Result<()> {
        *self.ids.lock().unwrap_or_else(|e| e.into_inner()) = ids.to_vec();
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i64]) -> Vec<SubscriberId> {
        raw.iter().copied().map(SubscriberId).collect()
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileSubscriberStore::new(tmp.path().join("subscribers.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_load_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("subscribers.json");
        let store = JsonFileSubscriberStore::new(&path);

        store.save(&ids(&[42, -1001, 7])).await.unwrap();

        // A fresh store instance simulates a restart.
        let reopened = JsonFileSubscriberStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), ids(&[42, -1001, 7]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("subscribers.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileSubscriberStore::new(&path);
        assert!(matches!(store.load().await, Err(Error::Corrupt(_))));
    }

    #[test]
    fn mutations_report_changes() {
        let mut list = ids(&[1]);
        assert!(!Mutation::Add(SubscriberId(1)).apply(&mut list));
        assert!(Mutation::Add(SubscriberId(2)).apply(&mut list));
        assert!(!Mutation::Seed(SubscriberId(3)).apply(&mut list));
        assert!(Mutation::Remove(SubscriberId(1)).apply(&mut list));
        assert!(!Mutation::Remove(SubscriberId(1)).apply(&mut list));
        assert_eq!(list, ids(&[2]));

        let mut empty = Vec::new();
        assert!(Mutation::Seed(SubscriberId(3)).apply(&mut empty));
        assert_eq!(empty, ids(&[3]));
    }

    #[tokio::test]
    async fn update_merges_with_what_another_writer_saved() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("subscribers.json");
        let ours = JsonFileSubscriberStore::new(&path);
        let theirs = JsonFileSubscriberStore::new(&path);

        ours.update(Mutation::Add(SubscriberId(1))).await.unwrap();
        theirs.update(Mutation::Add(SubscriberId(7))).await.unwrap();
        let (list, changed) = ours.update(Mutation::Add(SubscriberId(8))).await.unwrap();

        assert!(changed);
        assert_eq!(list, ids(&[1, 7, 8]));
        assert_eq!(theirs.load().await.unwrap(), ids(&[1, 7, 8]));
        assert!(path.with_file_name("subscribers.json.lock").exists());
    }

    #[tokio::test]
    async fn unchanged_update_does_not_rewrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("subscribers.json");
        let store = JsonFileSubscriberStore::new(&path);

        let (list, changed) = store.update(Mutation::Remove(SubscriberId(5))).await.unwrap();
        assert!(!changed);
        assert!(list.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_location_is_a_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent "directory" is a regular file, so the write must fail.
        let store = JsonFileSubscriberStore::new(blocker.join("subscribers.json"));
        assert!(matches!(
            store.save(&ids(&[1])).await,
            Err(Error::Persistence { .. })
        ));
    }
}
