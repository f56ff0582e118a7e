/// Boot-time network readiness: wait for a default IPv4 route before the
/// first camera probe, so a kiosk that starts before Wi-Fi is up does not
/// burn its first attempts against an unroutable network.
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const ROUTE_TABLE: &str = "/proc/net/route";
const RTF_UP: u32 = 0x1;

/// True if a `/proc/net/route` style table has an up default route.
fn has_default_route_in(table: &str) -> bool {
    table.lines().skip(1).any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return false;
        }
        let flags = u32::from_str_radix(fields[3], 16).unwrap_or(0);
        fields[1] == "00000000" && flags & RTF_UP != 0
    })
}

fn has_default_route(table_path: &Path) -> bool {
    match std::fs::read_to_string(table_path) {
        Ok(table) => has_default_route_in(&table),
        Err(e) => {
            tracing::debug!(path = %table_path.display(), error = %e, "cannot read route table");
            false
        }
    }
}

/// Poll the kernel route table until a default route shows up.
///
/// Returns `true` once routed, `false` on timeout or cancellation.
pub async fn wait_for_default_route(timeout: Duration, token: &CancellationToken) -> bool {
    wait_for_route_in(Path::new(ROUTE_TABLE), timeout, Duration::from_secs(1), token).await
}

async fn wait_for_route_in(
    table_path: &Path,
    timeout: Duration,
    poll: Duration,
    token: &CancellationToken,
) -> bool {
    let start = Instant::now();
    loop {
        if has_default_route(table_path) {
            tracing::info!(waited_ms = start.elapsed().as_millis() as u64, "default route present");
            return true;
        }
        if start.elapsed() >= timeout {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "no default route; starting supervision anyway"
            );
            return false;
        }
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}
