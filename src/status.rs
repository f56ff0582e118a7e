/// Status file: a JSON snapshot of the supervisor, rewritten on every state
/// transition and removed on clean shutdown.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Supervision loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    WaitingForNetwork,
    Resolving,
    Launching,
    Running,
    Exited,
    IpChanged,
    Error,
    Backoff,
    Stopping,
    Stopped,
}

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub pid: u32,
    pub state: SupervisorState,
    pub host: Option<String>,
    pub player_pid: Option<u32>,
    pub restarts: u64,
    pub backoff_secs: f64,
    pub last_exit_code: Option<i32>,
    pub session_start: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

/// Snapshot destination. Each write goes to `<path>.tmp.<pid>` first and is
/// renamed over `path`, so readers only ever see a complete document.
pub struct StatusFile {
    path: PathBuf,
    staging: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        let mut staging = path.clone().into_os_string();
        staging.push(format!(".tmp.{}", std::process::id()));
        Self {
            path,
            staging: PathBuf::from(staging),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json = serde_json::to_vec_pretty(data).map_err(StatusError::Encode)?;
        std::fs::write(&self.staging, json).map_err(|source| StatusError::Io {
            action: "write",
            path: self.staging.clone(),
            source,
        })?;
        if let Err(source) = std::fs::rename(&self.staging, &self.path) {
            let _ = std::fs::remove_file(&self.staging);
            return Err(StatusError::Io {
                action: "publish",
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Delete the snapshot on clean shutdown. A missing file is fine.
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove status file")
            }
        }
    }
}

/// Mutable state tracker that builds StatusData for each update.
///
/// Without a configured path every update is a no-op.
pub struct StatusTracker {
    file: Option<StatusFile>,
    pid: u32,
    host: Option<String>,
    player_pid: Option<u32>,
    restarts: u64,
    backoff_secs: f64,
    last_exit_code: Option<i32>,
    session_start: Option<DateTime<Utc>>,
}

impl StatusTracker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            file: path.map(StatusFile::new),
            pid: std::process::id(),
            host: None,
            player_pid: None,
            restarts: 0,
            backoff_secs: 0.0,
            last_exit_code: None,
            session_start: None,
        }
    }

    /// Build a snapshot for `state` and write it if a file is configured.
    pub fn update(&self, state: SupervisorState) {
        let Some(file) = &self.file else {
            return;
        };
        let data = StatusData {
            pid: self.pid,
            state,
            host: self.host.clone(),
            player_pid: self.player_pid,
            restarts: self.restarts,
            backoff_secs: self.backoff_secs,
            last_exit_code: self.last_exit_code,
            session_start: self.session_start,
            last_update: Utc::now(),
        };

        if let Err(e) = file.write(&data) {
            tracing::warn!(error = %e, "failed to write status file");
        }
    }

    pub fn set_host(&mut self, host: &str) {
        self.host = Some(host.to_string());
    }

    /// Record a freshly launched player and mark the session start.
    pub fn set_player(&mut self, pid: u32) {
        self.player_pid = Some(pid);
        self.session_start = Some(Utc::now());
    }

    pub fn clear_player(&mut self) {
        self.player_pid = None;
        self.session_start = None;
    }

    pub fn record_restart(&mut self) {
        self.restarts += 1;
    }

    pub fn set_backoff_secs(&mut self, secs: f64) {
        self.backoff_secs = secs;
    }

    pub fn set_last_exit_code(&mut self, code: Option<i32>) {
        self.last_exit_code = code;
    }

    pub fn remove(&self) {
        if let Some(file) = &self.file {
            file.remove();
        }
    }
}

#[derive(Debug)]
pub enum StatusError {
    Encode(serde_json::Error),
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Encode(e) => write!(f, "status snapshot not encodable: {e}"),
            StatusError::Io {
                action,
                path,
                source,
            } => write!(f, "could not {action} status file {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Encode(e) => Some(e),
            StatusError::Io { source, .. } => Some(source),
        }
    }
}
