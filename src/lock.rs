/// Single-instance guard: two supervisors would fight over one display.
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Holds an exclusive advisory lock until dropped.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

#[derive(Debug)]
pub enum LockError {
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Another process already holds the lock.
    Held { path: PathBuf },
    /// The lock call itself failed (e.g. ENOLCK on a network filesystem).
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Open { path, source } => {
                write!(f, "failed to open lock file {}: {source}", path.display())
            }
            LockError::Held { path } => write!(
                f,
                "another camkeeper instance holds {}",
                path.display()
            ),
            LockError::Lock { path, source } => {
                write!(f, "failed to lock {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Open { source, .. } => Some(source),
            LockError::Held { .. } => None,
            LockError::Lock { source, .. } => Some(source),
        }
    }
}

impl InstanceLock {
    /// Take the lock without blocking.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| LockError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;

        file.try_lock_exclusive().map_err(|e| lock_failure(path, e))?;

        tracing::debug!(path = %path.display(), "instance lock acquired");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Contention means another instance; anything else is a real I/O failure.
fn lock_failure(path: &Path, source: std::io::Error) -> LockError {
    if source.kind() == fs2::lock_contended_error().kind() {
        LockError::Held {
            path: path.to_path_buf(),
        }
    } else {
        LockError::Lock {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("camkeeper.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert_eq!(first.path(), path);

        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));
        assert!(err.to_string().contains("another camkeeper instance"));
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("camkeeper.lock");

        drop(InstanceLock::acquire(&path).unwrap());
        assert!(InstanceLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_open_failure() {
        let err = InstanceLock::acquire(Path::new("/nonexistent/dir/camkeeper.lock")).unwrap_err();
        assert!(matches!(err, LockError::Open { .. }));
    }

    #[test]
    fn test_only_contention_maps_to_held() {
        let path = Path::new("camkeeper.lock");

        let contended = lock_failure(path, fs2::lock_contended_error());
        assert!(matches!(contended, LockError::Held { .. }));

        let enolck = std::io::Error::from_raw_os_error(nix::errno::Errno::ENOLCK as i32);
        let err = lock_failure(path, enolck);
        assert!(matches!(err, LockError::Lock { .. }));
        assert!(err.to_string().contains("failed to lock"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
