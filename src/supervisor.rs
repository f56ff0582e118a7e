/// The supervision loop.
///
/// RESOLVING -> LAUNCHING -> RUNNING -> (EXITED | IP_CHANGED | ERROR) and
/// back to RESOLVING, until the cancellation token fires. The supervisor
/// owns at most one player at a time and never returns while one is alive.
use crate::backoff::Backoff;
use crate::config::KeeperConfig;
use crate::network;
use crate::player::{self, LaunchError, PlayerProcess};
use crate::resolver;
use crate::status::{StatusTracker, SupervisorState};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Observable supervisor transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    State(SupervisorState),
    Launched { host: String, pid: u32 },
    Exited { code: Option<i32>, signal: Option<i32> },
    RetryScheduled { delay: Duration },
    HostSwitched { from: String, to: String },
    Stopped,
}

/// Why a session failed without the player simply exiting.
#[derive(Debug)]
enum SessionFailure {
    Launch(LaunchError),
    Poll(std::io::Error),
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionFailure::Launch(e) => write!(f, "{e}"),
            SessionFailure::Poll(e) => write!(f, "failed to poll player: {e}"),
        }
    }
}

/// How a RUNNING session ended.
#[derive(Debug)]
enum SessionEnd {
    Exited(ExitStatus),
    HostChanged(String),
    Failed(SessionFailure),
    Cancelled,
}

pub struct Supervisor {
    config: KeeperConfig,
    backoff: Backoff,
    player: Option<PlayerProcess>,
    /// Host picked by a mid-stream re-resolution, used by the next launch.
    pending_host: Option<String>,
    status: StatusTracker,
    events: Option<UnboundedSender<SupervisorEvent>>,
}

impl Supervisor {
    pub fn new(config: KeeperConfig) -> Self {
        Self {
            backoff: Backoff::from_config(&config.backoff),
            status: StatusTracker::new(config.status.file.clone()),
            config,
            player: None,
            pending_host: None,
            events: None,
        }
    }

    /// Publish transitions on `tx` in addition to logging them.
    pub fn with_events(mut self, tx: UnboundedSender<SupervisorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run until `token` is cancelled. Stops the player before returning.
    pub async fn run(&mut self, token: CancellationToken) {
        self.backoff.reset();
        tracing::info!(
            candidates = ?self.config.camera.hosts,
            port = self.config.camera.port,
            player = %self.config.player.command,
            "supervisor starting"
        );

        if self.config.network.wait_for_route {
            self.transition(SupervisorState::WaitingForNetwork);
            let timeout = Duration::from_secs(self.config.network.route_timeout_secs);
            network::wait_for_default_route(timeout, &token).await;
        }

        while !token.is_cancelled() {
            self.transition(SupervisorState::Resolving);
            let host = match self.pending_host.take() {
                Some(host) => host,
                None => tokio::select! {
                    _ = token.cancelled() => break,
                    res = resolver::resolve(&self.config.camera) => res.host,
                },
            };
            self.status.set_host(&host);

            self.transition(SupervisorState::Launching);
            let end = match player::launch(&self.config.player, &self.config.camera, &host) {
                Ok(process) => {
                    self.emit(SupervisorEvent::Launched {
                        host: host.clone(),
                        pid: process.pid(),
                    });
                    self.status.set_player(process.pid());
                    self.player = Some(process);
                    self.transition(SupervisorState::Running);
                    self.monitor(&token).await
                }
                Err(e) => SessionEnd::Failed(SessionFailure::Launch(e)),
            };

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::HostChanged(new_host) => {
                    self.transition(SupervisorState::IpChanged);
                    tracing::info!(from = %host, to = %new_host, "camera address changed; switching");
                    self.stop_player().await;
                    self.backoff.reset();
                    self.status.record_restart();
                    self.status.set_backoff_secs(self.backoff.current().as_secs_f64());
                    self.emit(SupervisorEvent::HostSwitched {
                        from: host,
                        to: new_host.clone(),
                    });
                    self.pending_host = Some(new_host);
                }
                SessionEnd::Exited(status) => {
                    self.transition(SupervisorState::Exited);
                    tracing::warn!(
                        exit_code = ?status.code(),
                        signal = ?status.signal(),
                        "player exited"
                    );
                    self.status.set_last_exit_code(status.code());
                    self.emit(SupervisorEvent::Exited {
                        code: status.code(),
                        signal: status.signal(),
                    });
                    self.finish_session().await;
                    if !self.sleep_backoff(&token).await {
                        break;
                    }
                }
                SessionEnd::Failed(failure) => {
                    self.transition(SupervisorState::Error);
                    tracing::error!(error = %failure, detail = ?failure, "player session failed");
                    self.finish_session().await;
                    if !self.sleep_backoff(&token).await {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Poll the running player and periodically re-resolve the camera.
    async fn monitor(&mut self, token: &CancellationToken) -> SessionEnd {
        let check_every = self.config.supervisor.ip_check_interval();
        let mut ticker = tokio::time::interval(self.config.supervisor.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_check = Instant::now();

        loop {
            tokio::select! {
                _ = token.cancelled() => return SessionEnd::Cancelled,
                _ = ticker.tick() => {}
            }

            let Some(process) = self.player.as_mut() else {
                return SessionEnd::Failed(SessionFailure::Poll(std::io::Error::other(
                    "no player to monitor",
                )));
            };
            match process.try_exit() {
                Ok(Some(status)) => return SessionEnd::Exited(status),
                Ok(None) => {}
                Err(e) => return SessionEnd::Failed(SessionFailure::Poll(e)),
            }
            let current = process.host().to_string();

            if last_check.elapsed() >= check_every {
                last_check = Instant::now();
                tracing::debug!(current = %current, "re-resolving camera address");
                let res = tokio::select! {
                    _ = token.cancelled() => return SessionEnd::Cancelled,
                    res = resolver::resolve(&self.config.camera) => res,
                };
                if res.reachable && res.host != current {
                    return SessionEnd::HostChanged(res.host);
                }
            }
        }
    }

    /// Reap the finished session, resetting backoff if it ran long enough.
    async fn finish_session(&mut self) {
        let Some(process) = self.player.take() else {
            return;
        };
        let uptime = process.uptime();
        process.stop(self.config.supervisor.grace()).await;
        self.status.clear_player();

        if let Some(stable) = self.config.backoff.stable_after() {
            if uptime >= stable {
                tracing::info!(uptime_secs = uptime.as_secs(), "session was stable; resetting backoff");
                self.backoff.reset();
            }
        }
    }

    /// Sleep the current backoff delay. Returns `false` if cancelled.
    async fn sleep_backoff(&mut self, token: &CancellationToken) -> bool {
        let delay = self.backoff.advance();
        self.status.record_restart();
        self.status.set_backoff_secs(delay.as_secs_f64());
        self.transition(SupervisorState::Backoff);
        self.emit(SupervisorEvent::RetryScheduled { delay });
        tracing::info!(
            delay_secs = delay.as_secs_f64(),
            next_delay_secs = self.backoff.current().as_secs_f64(),
            "restarting player after delay"
        );

        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn stop_player(&mut self) {
        if let Some(process) = self.player.take() {
            process.stop(self.config.supervisor.grace()).await;
        }
        self.status.clear_player();
    }

    async fn shutdown(&mut self) {
        self.transition(SupervisorState::Stopping);
        self.stop_player().await;
        self.transition(SupervisorState::Stopped);
        self.status.remove();
        self.emit(SupervisorEvent::Stopped);
        tracing::info!("supervisor stopped");
    }

    fn transition(&self, state: SupervisorState) {
        tracing::debug!(?state, "state transition");
        self.status.update(state);
        self.emit(SupervisorEvent::State(state));
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
