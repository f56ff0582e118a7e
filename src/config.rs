use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from camkeeper.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KeeperConfig {
    pub camera: CameraEndpoint,
    pub player: PlayerConfig,
    pub supervisor: SupervisorConfig,
    pub backoff: BackoffConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
    pub status: StatusConfig,
    pub lock: LockConfig,
}

/// Where the camera lives and how to authenticate against it.
///
/// `hosts` is an ordered preference list: the first reachable entry wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraEndpoint {
    pub hosts: Vec<String>,
    pub port: u16,
    pub path: String,
    pub username: String,
    pub password: String,
    pub scheme: String,
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub command: String,
    pub fullscreen: bool,
    pub no_video_title: bool,
    /// Player-side network buffer; 0 leaves the player default in place.
    pub network_caching_ms: u32,
    pub rtsp_tcp: bool,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub poll_interval_ms: u64,
    pub ip_check_interval_secs: f64,
    pub grace_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub growth_factor: f64,
    /// Sessions at least this long reset the backoff. 0 disables.
    pub stable_after_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wait_for_route: bool,
    pub route_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: PathBuf,
    pub max_bytes: u64,
    pub backups: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StatusConfig {
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub file: PathBuf,
}

// --- Default implementations ---

impl Default for CameraEndpoint {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            port: 554,
            path: "h264Preview_01_main".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            scheme: "rtsp".to_string(),
            probe_timeout_ms: 1000,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: "cvlc".to_string(),
            fullscreen: true,
            no_video_title: true,
            network_caching_ms: 300,
            rtsp_tcp: false,
            extra_args: Vec::new(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            ip_check_interval_secs: 120.0,
            grace_secs: 5.0,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 3.0,
            max_delay_secs: 30.0,
            growth_factor: 1.6,
            stable_after_secs: 300.0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wait_for_route: true,
            route_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("camkeeper.log"),
            max_bytes: 1024 * 1024,
            backups: 3,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("camkeeper.lock"),
        }
    }
}

// --- Duration accessors ---

impl CameraEndpoint {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ip_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.ip_check_interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs_f64(self.grace_secs)
    }
}

impl BackoffConfig {
    /// `None` when the stable-session reset is disabled.
    pub fn stable_after(&self) -> Option<Duration> {
        (self.stable_after_secs > 0.0).then(|| Duration::from_secs_f64(self.stable_after_secs))
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Upper bound for every `*_secs` setting: one day.
const MAX_SECS: f64 = 86_400.0;

/// Reject values `Duration::from_secs_f64` would panic on, plus absurd ones.
fn check_secs(name: &str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if value.is_finite() && lower_ok && value <= MAX_SECS {
        return Ok(());
    }
    let lower = if allow_zero { "at least 0" } else { "above 0" };
    Err(ConfigError::Invalid(format!(
        "{name} must be {lower} and at most {MAX_SECS}, got {value}"
    )))
}

impl KeeperConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(path, &contents)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check the invariants the supervisor relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.hosts.is_empty() {
            return Err(ConfigError::Invalid(
                "camera.hosts must list at least one candidate (CAM_IPS)".to_string(),
            ));
        }
        if self.camera.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "camera.hosts contains a blank entry".to_string(),
            ));
        }
        if self.camera.port == 0 {
            return Err(ConfigError::Invalid("camera.port must be non-zero".to_string()));
        }
        if self.player.command.trim().is_empty() {
            return Err(ConfigError::Invalid("player.command is empty".to_string()));
        }
        if self.supervisor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        check_secs(
            "supervisor.ip_check_interval_secs",
            self.supervisor.ip_check_interval_secs,
            false,
        )?;
        check_secs("supervisor.grace_secs", self.supervisor.grace_secs, true)?;
        let b = &self.backoff;
        check_secs("backoff.initial_delay_secs", b.initial_delay_secs, false)?;
        check_secs("backoff.max_delay_secs", b.max_delay_secs, false)?;
        check_secs("backoff.stable_after_secs", b.stable_after_secs, true)?;
        if b.initial_delay_secs > b.max_delay_secs {
            return Err(ConfigError::Invalid(format!(
                "backoff.initial_delay_secs ({}) exceeds max_delay_secs ({})",
                b.initial_delay_secs, b.max_delay_secs
            )));
        }
        if !b.growth_factor.is_finite() || b.growth_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.growth_factor must be a finite number >= 1.0, got {}",
                b.growth_factor
            )));
        }
        Ok(())
    }
}
