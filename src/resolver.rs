/// Camera address discovery: pick the first candidate host that accepts a
/// TCP connection on the RTSP port.
use crate::config::CameraEndpoint;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Outcome of a resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub host: String,
    /// `false` when nothing answered and `host` is the fallback entry.
    pub reachable: bool,
}

/// Try a single TCP connect; the stream is dropped as soon as it opens.
pub async fn is_reachable(host: &str, port: u16, probe_timeout: Duration) -> bool {
    match timeout(probe_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            tracing::debug!(host, port, error = %e, "camera probe refused");
            false
        }
        Err(_) => {
            tracing::debug!(host, port, timeout_ms = probe_timeout.as_millis() as u64, "camera probe timed out");
            false
        }
    }
}

/// Probe candidates in order and return the first reachable one.
///
/// Falls back to the first candidate when none answers so the caller always
/// has something to hand the player.
pub async fn resolve(camera: &CameraEndpoint) -> Resolution {
    let probe_timeout = camera.probe_timeout();
    for host in &camera.hosts {
        if is_reachable(host, camera.port, probe_timeout).await {
            tracing::info!(host = %host, port = camera.port, "camera reachable");
            return Resolution {
                host: host.clone(),
                reachable: true,
            };
        }
    }

    let fallback = camera.hosts.first().cloned().unwrap_or_default();
    tracing::warn!(
        candidates = ?camera.hosts,
        port = camera.port,
        fallback = %fallback,
        "no camera answering; will still try the player with the first candidate"
    );
    Resolution {
        host: fallback,
        reachable: false,
    }
}
