//! OS advisory file locking with stale-lockfile breaking.
//!
//! Runs entirely on blocking threads (callers wrap these in `spawn_blocking`);
//! `fs4::FileExt` only has a synchronous, non-async API.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use fs4::FileExt;
use pi_runtime_core::RuntimeError;

pub(crate) struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub(crate) fn acquire_exclusive(
    lock_path: &Path,
    timeout: Duration,
    stale_after: Duration,
) -> Result<LockGuard, RuntimeError> {
    acquire(lock_path, timeout, stale_after, |f| f.try_lock_exclusive())
}

pub(crate) fn acquire_shared(
    lock_path: &Path,
    timeout: Duration,
    stale_after: Duration,
) -> Result<LockGuard, RuntimeError> {
    acquire(lock_path, timeout, stale_after, |f| f.try_lock_shared())
}

fn acquire(
    lock_path: &Path,
    timeout: Duration,
    stale_after: Duration,
    try_lock: impl Fn(&File) -> io::Result<()>,
) -> Result<LockGuard, RuntimeError> {
    let start = Instant::now();
    let mut backoff = Duration::from_millis(5);

    loop {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(|_| RuntimeError::lock_timeout())?;

        if try_lock(&file).is_ok() {
            write_owner_pid(&file);
            return Ok(LockGuard { file });
        }

        if start.elapsed() >= timeout {
            return Err(RuntimeError::lock_timeout());
        }

        if break_if_stale(lock_path, stale_after) {
            continue;
        }

        std::thread::sleep(backoff.min(timeout.saturating_sub(start.elapsed())));
        backoff = (backoff * 2).min(Duration::from_millis(200));
    }
}

fn write_owner_pid(file: &File) {
    use std::io::Write;
    let _ = file.set_len(0);
    let mut handle = file;
    let _ = handle.write_all(process::id().to_string().as_bytes());
}

/// Breaks `lock_path` if it is older than `stale_after` and its recorded owner
/// PID is no longer alive. Returns `true` if the lockfile was removed.
fn break_if_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let Ok(metadata) = fs::metadata(lock_path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    let Ok(age) = std::time::SystemTime::now().duration_since(modified) else {
        return false;
    };
    if age < stale_after {
        return false;
    }

    let owner_alive = fs::read_to_string(lock_path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .map(pid_is_alive)
        .unwrap_or(false);

    if owner_alive {
        return false;
    }

    fs::remove_file(lock_path).is_ok()
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

pub(crate) fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
