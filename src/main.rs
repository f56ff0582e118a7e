use camkeeper::config::{ConfigError, KeeperConfig};
use camkeeper::lock::InstanceLock;
use camkeeper::supervisor::Supervisor;
use camkeeper::{logging, player, resolver, signals};
use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Keeps an RTSP camera feed playing: probe the camera's candidate addresses,
/// run the player against the first one that answers, restart it with backoff
/// when it dies, and follow the camera when its address changes.
#[derive(Parser, Debug)]
#[command(name = "camkeeper", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CAMKEEPER_CONFIG", default_value = "camkeeper.toml")]
    config: PathBuf,

    /// Candidate camera addresses, comma-separated, in preference order
    #[arg(long, env = "CAM_IPS", value_delimiter = ',')]
    ips: Vec<String>,

    /// RTSP stream path (overrides config)
    #[arg(long, env = "RTSP_PATH")]
    rtsp_path: Option<String>,

    /// Camera username (overrides config)
    #[arg(long, env = "CAM_USER")]
    user: Option<String>,

    /// Camera password (overrides config)
    #[arg(long, env = "CAM_PASS", hide_env_values = true)]
    pass: Option<String>,

    /// RTSP port (overrides config)
    #[arg(long, env = "RTSP_PORT")]
    port: Option<u16>,

    /// Player network-caching buffer in ms (overrides config)
    #[arg(long, env = "NETWORK_CACHING")]
    network_caching: Option<u32>,

    /// Run the player fullscreen (overrides config)
    #[arg(long, env = "FULLSCREEN", value_parser = BoolishValueParser::new())]
    fullscreen: Option<bool>,

    /// Ask the player to pull RTSP over TCP (overrides config)
    #[arg(long, env = "RTSP_TCP", value_parser = BoolishValueParser::new())]
    rtsp_tcp: Option<bool>,

    /// Extra player arguments, whitespace-separated (overrides config)
    #[arg(long, env = "VLC_EXTRA_ARGS", allow_hyphen_values = true)]
    extra_args: Option<String>,

    /// Player binary (overrides config)
    #[arg(long, env = "PLAYER_CMD")]
    player: Option<String>,

    /// Log file path (overrides config)
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Initial restart delay in seconds (overrides config)
    #[arg(long, env = "RETRY_INITIAL")]
    retry_initial: Option<f64>,

    /// Maximum restart delay in seconds (overrides config)
    #[arg(long, env = "RETRY_MAX")]
    retry_max: Option<f64>,

    /// Seconds between camera address re-checks (overrides config)
    #[arg(long, env = "IP_CHECK_INTERVAL")]
    ip_check_interval: Option<f64>,

    /// Write a JSON status snapshot here on every state change
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Skip waiting for a default route at startup
    #[arg(long)]
    no_wait_network: bool,

    /// Validate config, print the player command and resolved camera, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (probe results, state transitions)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer CLI/environment overrides on top of the file config.
    fn apply(&self, cfg: &mut KeeperConfig) {
        let ips: Vec<String> = self
            .ips
            .iter()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .collect();
        if !ips.is_empty() {
            cfg.camera.hosts = ips;
        }
        if let Some(path) = non_blank(&self.rtsp_path) {
            cfg.camera.path = path.to_string();
        }
        if let Some(user) = &self.user {
            cfg.camera.username = user.clone();
        }
        if let Some(pass) = &self.pass {
            cfg.camera.password = pass.clone();
        }
        if let Some(port) = self.port {
            cfg.camera.port = port;
        }
        if let Some(ms) = self.network_caching {
            cfg.player.network_caching_ms = ms;
        }
        if let Some(fullscreen) = self.fullscreen {
            cfg.player.fullscreen = fullscreen;
        }
        if let Some(tcp) = self.rtsp_tcp {
            cfg.player.rtsp_tcp = tcp;
        }
        if let Some(extra) = non_blank(&self.extra_args) {
            cfg.player.extra_args = extra.split_whitespace().map(str::to_string).collect();
        }
        if let Some(command) = non_blank(&self.player) {
            cfg.player.command = command.to_string();
        }
        if let Some(file) = &self.log_file {
            cfg.logging.file = file.clone();
        }
        if let Some(secs) = self.retry_initial {
            cfg.backoff.initial_delay_secs = secs;
        }
        if let Some(secs) = self.retry_max {
            cfg.backoff.max_delay_secs = secs;
        }
        if let Some(secs) = self.ip_check_interval {
            cfg.supervisor.ip_check_interval_secs = secs;
        }
        if let Some(file) = &self.status_file {
            cfg.status.file = Some(file.clone());
        }
        if self.no_wait_network {
            cfg.network.wait_for_route = false;
        }
    }

    fn resolve_config(&self) -> Result<KeeperConfig, ConfigError> {
        let mut cfg = KeeperConfig::load(&self.config)?;
        self.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }
}

/// An exported-but-empty variable counts as unset.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

async fn dry_run(config: &KeeperConfig) {
    println!("camkeeper v{}", env!("CARGO_PKG_VERSION"));
    println!("Candidates: {}", config.camera.hosts.join(", "));

    let res = resolver::resolve(&config.camera).await;
    if res.reachable {
        println!("Resolved: {} (reachable)", res.host);
    } else {
        println!("Resolved: {} (fallback, nothing answered)", res.host);
    }

    let args = player::build_args(
        &config.player,
        &player::masked_stream_url(&config.camera, &res.host),
    );
    println!("Player: {} {}", config.player.command, args.join(" "));
    println!("Log file: {}", config.logging.file.display());
    println!(
        "Backoff: {}s -> {}s (x{})",
        config.backoff.initial_delay_secs,
        config.backoff.max_delay_secs,
        config.backoff.growth_factor
    );
    println!("Dry run: config is valid, player not started.");
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("camkeeper: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        dry_run(&config).await;
        return ExitCode::SUCCESS;
    }

    let lock = match InstanceLock::acquire(&config.lock.file) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("camkeeper: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!(
            "camkeeper: failed to open log file {}: {e}",
            config.logging.file.display()
        );
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        lock = %lock.path().display(),
        "camkeeper starting"
    );

    let token = CancellationToken::new();
    if let Err(e) = signals::install(token.clone()) {
        tracing::error!(error = %e, "failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    let mut supervisor = Supervisor::new(config);
    supervisor.run(token).await;
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parse argv only; env-sourced values from the developer's shell are ignored.
    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["camkeeper"];
        argv.extend_from_slice(args);
        let matches = Cli::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(argv)
            .unwrap();
        Cli::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn test_overrides_apply_on_top_of_file_config() {
        let cli = parse(&[
            "--ips",
            "192.168.86.27, 192.168.86.24,",
            "--rtsp-path",
            "h264Preview_01_sub",
            "--pass",
            "secret",
            "--port",
            "8554",
            "--fullscreen",
            "false",
            "--rtsp-tcp",
            "yes",
            "--extra-args",
            "--no-audio  --loop",
            "--retry-initial",
            "1.5",
            "--ip-check-interval",
            "30",
            "--no-wait-network",
        ]);
        let mut cfg = KeeperConfig::default();
        cli.apply(&mut cfg);

        assert_eq!(cfg.camera.hosts, vec!["192.168.86.27", "192.168.86.24"]);
        assert_eq!(cfg.camera.path, "h264Preview_01_sub");
        assert_eq!(cfg.camera.password, "secret");
        assert_eq!(cfg.camera.port, 8554);
        assert!(!cfg.player.fullscreen);
        assert!(cfg.player.rtsp_tcp);
        assert_eq!(cfg.player.extra_args, vec!["--no-audio", "--loop"]);
        assert_eq!(cfg.backoff.initial_delay_secs, 1.5);
        assert_eq!(cfg.supervisor.ip_check_interval_secs, 30.0);
        assert!(!cfg.network.wait_for_route);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_resolve_config_reads_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camkeeper.toml");
        std::fs::write(&path, "[camera]\nhosts = [\"10.0.0.5\", \"10.0.0.6\"]\n").unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--retry-max", "90"]);
        let cfg = cli.resolve_config().unwrap();
        assert_eq!(cfg.camera.hosts, vec!["10.0.0.5", "10.0.0.6"]);
        assert_eq!(cfg.backoff.max_delay_secs, 90.0);
    }

    #[test]
    fn test_resolve_config_rejects_bad_backoff() {
        let cli = parse(&[
            "--config",
            "/nonexistent/camkeeper.toml",
            "--ips",
            "10.0.0.5",
            "--retry-initial",
            "60",
            "--retry-max",
            "30",
        ]);
        let err = cli.resolve_config().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_parse_ignores_process_environment() {
        let cli = parse(&[]);
        assert!(cli.ips.is_empty());
        assert!(cli.retry_max.is_none());
        assert!(cli.pass.is_none());
        assert_eq!(cli.config, PathBuf::from("camkeeper.toml"));
    }

    #[test]
    fn test_blank_overrides_keep_file_values() {
        let cli = parse(&["--extra-args", "  ", "--player", "", "--rtsp-path", ""]);
        let mut cfg = KeeperConfig::default();
        cfg.player.extra_args = vec!["--no-audio".to_string()];
        cfg.player.command = "vlc".to_string();
        cli.apply(&mut cfg);

        assert_eq!(cfg.player.extra_args, vec!["--no-audio"]);
        assert_eq!(cfg.player.command, "vlc");
        assert_eq!(cfg.camera.path, "h264Preview_01_main");
    }
}
