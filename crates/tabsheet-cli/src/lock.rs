//! Advisory lock file serializing concurrent read-modify-write runs on the
//! same output
//!
//! The lock file holds the PID of its owner. A process waits with a growing,
//! jittered backoff while the file exists, then writes its PID, pauses for a
//! random moment and reads the file back: whoever's PID survived owns the
//! lock. Locks older than the timeout (plus a small grace period) are stale
//! and removed.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};

/// How long to wait for another process before giving up
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(180);

/// Extra age beyond the timeout after which a lock is considered abandoned
pub const STALE_GRACE: Duration = Duration::from_secs(2);

/// Default lock path for an output file: `<out>.lock`
pub fn default_lock_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Path that receives the output when the lock could not be taken: `<out>.<pid>`
pub fn fallback_output(out: &str, pid: u32) -> String {
    format!("{}.{}", out, pid)
}

/// An acquired lock; the file is removed on drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "releasing lock");
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("could not remove lock file {}: {}", self.path.display(), e);
        }
    }
}

/// Lock acquisition settings
#[derive(Debug, Clone)]
pub struct Locker {
    path: PathBuf,
    timeout: Duration,
    /// Initial backoff, grown by a random fraction of a second per retry
    first_wait: Duration,
    /// Upper bound of the random pause between writing and re-reading the PID
    settle: Duration,
    pid: u32,
}

impl Locker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: LOCK_TIMEOUT,
            first_wait: Duration::from_secs(1),
            settle: Duration::from_secs(1),
            pid: std::process::id(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn first_wait(mut self, first_wait: Duration) -> Self {
        self.first_wait = first_wait;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file if it is older than the timeout plus grace
    ///
    /// Returns true if a stale lock was removed.
    pub fn remove_stale(&self) -> bool {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return false,
        };
        let stale = matches!(
            Utc::now().signed_duration_since(modified).to_std(),
            Ok(age) if age > self.timeout + STALE_GRACE
        );
        if !stale {
            return false;
        }
        warn!("removing stale lock: {}", self.path.display());
        // Another process may have removed it first
        fs::remove_file(&self.path).is_ok()
    }

    /// Wait for the lock; `None` means the timeout was reached
    pub fn acquire(&self) -> io::Result<Option<LockGuard>> {
        self.remove_stale();

        let pid = self.pid.to_string();
        let limit = self.timeout.as_secs_f64();
        let mut rng = rand::thread_rng();
        let mut waited = self.first_wait.as_secs_f64();
        let start = waited;

        while waited < limit {
            if self.path.exists() {
                waited += rng.gen::<f64>();
                sleep(Duration::from_secs_f64(waited));
                continue;
            }

            fs::write(&self.path, &pid)?;
            sleep(self.settle.mul_f64(rng.gen::<f64>()));
            match fs::read_to_string(&self.path) {
                Ok(owner) if owner == pid => {
                    if waited > start {
                        debug!("slept for {:.0}s waiting for lock", waited);
                    }
                    debug!(path = %self.path.display(), "grabbing lock");
                    return Ok(Some(LockGuard {
                        path: self.path.clone(),
                    }));
                }
                // Lost the race, or the lock was removed externally
                _ => continue,
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::SystemTime;

    fn quick(path: &Path) -> Locker {
        Locker::new(path)
            .first_wait(Duration::from_millis(10))
            .settle(Duration::from_millis(10))
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(
            default_lock_path(Path::new("dir/out.csv")),
            PathBuf::from("dir/out.csv.lock")
        );
        assert_eq!(fallback_output("out.csv", 42), "out.csv.42");
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv.lock");

        let guard = quick(&path).acquire().unwrap().expect("lock should be free");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
        assert_eq!(guard.path(), path.as_path());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_timeout_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("held.lock");
        fs::write(&path, "1").unwrap();

        let locker = quick(&path).timeout(Duration::from_millis(500));
        assert!(locker.acquire().unwrap().is_none());
        // The other owner's lock is left alone
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
    }

    #[test]
    fn test_stale_lock_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.lock");
        fs::write(&path, "1").unwrap();

        let locker = quick(&path).timeout(Duration::from_secs(5));
        assert!(!locker.remove_stale());
        assert!(path.exists());

        let old = SystemTime::now() - Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert!(locker.remove_stale());
        assert!(!path.exists());

        let guard = locker.acquire().unwrap();
        assert!(guard.is_some());
    }
}
