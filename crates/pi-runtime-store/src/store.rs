use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pi_runtime_core::RuntimeError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::lockfile::{self, LockGuard};

/// Atomic JSON read/modify/write with OS advisory locking for cross-process
/// shared state (§4.1). No component but this one writes the shared JSON files
/// directly; everything else goes through `with_lock`/`read_snapshot`.
pub struct StateStore {
    config: StoreConfig,
}

impl StateStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Acquires an exclusive lock on `path.lock`, reads `path` (or `T::default()`
    /// if missing or corrupt), passes it to `f`, and atomically writes the
    /// result back (temp file + rename) before releasing the lock.
    pub async fn with_lock<T, F>(&self, path: impl AsRef<Path>, f: F) -> Result<T, RuntimeError>
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
        F: FnOnce(T) -> T + Send + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let lock_timeout = self.config.lock_timeout;
        let lock_stale = self.config.lock_stale;

        let result = tokio::task::spawn_blocking(move || {
            with_lock_blocking(&path, lock_timeout, lock_stale, f)
        })
        .await
        .map_err(|_| RuntimeError::corrupt_state("lock worker panicked"))?;

        result
    }

    /// Acquires a shared lock on `path.lock` and returns the parsed contents of
    /// `path` (or `T::default()` if missing or corrupt).
    pub async fn read_snapshot<T>(&self, path: impl AsRef<Path>) -> Result<T, RuntimeError>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let lock_timeout = self.config.lock_timeout;
        let lock_stale = self.config.lock_stale;

        let result = tokio::task::spawn_blocking(move || {
            let lock_path = lockfile::lock_path_for(&path);
            let guard = lockfile::acquire_shared(&lock_path, lock_timeout, lock_stale)?;
            let value = read_json_or_default(&path);
            drop(guard);
            value
        })
        .await
        .map_err(|_| RuntimeError::corrupt_state("lock worker panicked"))?;

        result
    }
}

fn with_lock_blocking<T, F>(
    path: &Path,
    lock_timeout: Duration,
    lock_stale: Duration,
    f: F,
) -> Result<T, RuntimeError>
where
    T: Serialize + DeserializeOwned + Default,
    F: FnOnce(T) -> T,
{
    let lock_path = lockfile::lock_path_for(path);
    let guard: LockGuard = lockfile::acquire_exclusive(&lock_path, lock_timeout, lock_stale)?;

    let current = read_json_or_default(path)?;
    let next = f(current);
    write_atomic(path, &next)?;

    drop(guard);
    Ok(next)
}

/// Reads and parses `path`. A missing file yields the default. A file that
/// exists but fails to parse is quarantined to a `.corrupt-<ts>` sidecar and
/// the default is substituted, per the component's self-healing contract.
fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, RuntimeError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(_) => return Ok(T::default()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(_) => {
            let sidecar = quarantine_corrupt(path, &bytes);
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), sidecar = ?sidecar, "shared state file was corrupt, substituting default");
            Ok(T::default())
        }
    }
}

fn quarantine_corrupt(path: &Path, bytes: &[u8]) -> Option<PathBuf> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".corrupt-{ts}"));
    let sidecar = PathBuf::from(name);
    fs::write(&sidecar, bytes).ok()?;
    Some(sidecar)
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RuntimeError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|_| RuntimeError::corrupt_state(path.display().to_string()))?;

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(format!(".tmp-{}", process::id()));
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, &json)
        .map_err(|_| RuntimeError::corrupt_state(tmp_path.display().to_string()))?;
    fs::rename(&tmp_path, path).map_err(|_| RuntimeError::corrupt_state(path.display().to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        n: u64,
    }

    fn store() -> StateStore {
        StateStore::new(StoreConfig::builder().build())
    }

    #[tokio::test]
    async fn with_lock_creates_default_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = store();

        let result: Counter = store
            .with_lock(&path, |c: Counter| Counter { n: c.n + 1 })
            .await
            .unwrap();
        assert_eq!(result.n, 1);

        let result: Counter = store
            .with_lock(&path, |c: Counter| Counter { n: c.n + 1 })
            .await
            .unwrap();
        assert_eq!(result.n, 2);
    }

    #[tokio::test]
    async fn read_snapshot_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let store = store();

        let snapshot: Counter = store.read_snapshot(&path).await.unwrap();
        assert_eq!(snapshot, Counter::default());
    }

    #[tokio::test]
    async fn read_snapshot_sees_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = store();

        store
            .with_lock(&path, |c: Counter| Counter { n: c.n + 5 })
            .await
            .unwrap();

        let snapshot: Counter = store.read_snapshot(&path).await.unwrap();
        assert_eq!(snapshot.n, 5);
    }

    #[tokio::test]
    async fn corrupt_json_is_quarantined_and_default_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"not json").unwrap();
        let store = store();

        let snapshot: Counter = store.read_snapshot(&path).await.unwrap();
        assert_eq!(snapshot, Counter::default());

        let sidecar_exists = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(sidecar_exists);
    }

    #[tokio::test]
    async fn concurrent_with_lock_calls_serialize_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("state.json"));
        let store = Arc::new(store());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            let path = Arc::clone(&path);
            handles.push(tokio::spawn(async move {
                store
                    .with_lock(path.as_path(), |c: Counter| Counter { n: c.n + 1 })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snapshot: Counter = store.read_snapshot(path.as_path()).await.unwrap();
        assert_eq!(snapshot.n, 10);
    }
}
