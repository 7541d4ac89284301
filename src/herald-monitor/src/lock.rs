//! Single-instance guard for the monitor process.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MonitorError, MonitorResult};

pub const LOCK_FILE_NAME: &str = ".monitor.lock";

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Exclusive claim on a state directory, released when dropped.
///
/// A recorded pid that no longer denotes a live process is treated as a
/// stale lock and taken over.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    record: LockRecord,
}

impl InstanceLock {
    pub fn acquire(path: impl Into<PathBuf>) -> MonitorResult<Self> {
        let path = path.into();

        if let Some(existing) = read_record(&path) {
            if process_alive(existing.pid) {
                return Err(MonitorError::AlreadyRunning {
                    pid: existing.pid,
                    agent: existing.agent,
                    started_at: existing.started_at,
                    lock_path: path,
                });
            }
            warn!(
                lock_path = %path.display(),
                pid = existing.pid,
                "Removing stale monitor lock"
            );
        }

        let lock = Self {
            path,
            record: LockRecord {
                pid: std::process::id(),
                started_at: Utc::now(),
                agent: None,
            },
        };
        lock.write()?;
        debug!(lock_path = %lock.path.display(), pid = lock.record.pid, "Acquired monitor lock");
        Ok(lock)
    }

    /// Record the resolved identity in the lock file.
    pub fn set_agent(&mut self, agent: impl Into<String>) -> MonitorResult<()> {
        self.record.agent = Some(agent.into());
        self.write()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    fn write(&self) -> MonitorResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let data =
            serde_json::to_string(&self.record).map_err(|e| MonitorError::json(&self.path, e))?;
        fs::write(&self.path, data).map_err(|e| MonitorError::io(&self.path, e))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(lock_path = %self.path.display(), "Released monitor lock"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                error = %e,
                lock_path = %self.path.display(),
                "Failed to remove monitor lock file"
            ),
        }
    }
}

/// Read the current lock record; unreadable content counts as no lock.
pub fn read_record(path: &Path) -> Option<LockRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(lock_path = %path.display(), error = %e, "Ignoring unreadable monitor lock");
            None
        }
    }
}

/// Whether `pid` denotes a running process.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);

        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(read_record(&path).unwrap().pid, std::process::id());

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_live_holder_refuses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);

        let mut first = InstanceLock::acquire(&path).unwrap();
        first.set_agent("Nova").unwrap();

        match InstanceLock::acquire(&path) {
            Err(MonitorError::AlreadyRunning { pid, agent, .. }) => {
                assert_eq!(pid, std::process::id());
                assert_eq!(agent.as_deref(), Some("Nova"));
            }
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        let stale = LockRecord {
            pid: i32::MAX as u32,
            started_at: Utc::now(),
            agent: Some("Bolt".to_string()),
        };
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(lock.record().pid, std::process::id());
        assert_eq!(lock.record().agent, None);
    }

    #[test]
    fn test_garbage_lock_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        fs::write(&path, "12345\n").unwrap();

        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_own_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }
}
