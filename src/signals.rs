/// Signal handling for graceful shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both cancel the supervisor's token; the loop
/// then stops the player and returns.
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Spawn a task that cancels `token` on the first termination signal.
///
/// Listeners are registered before this returns, so a signal sent right
/// after the call is not lost.
pub fn install(token: CancellationToken) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = token.cancelled() => return,
        };
        tracing::info!(signal = name, "termination signal received; shutting down");
        token.cancel();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_cancels_token() {
        let token = CancellationToken::new();
        let handle = install(token.clone()).unwrap();

        kill(Pid::this(), Signal::SIGTERM).unwrap();

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .expect("token should be cancelled by SIGTERM");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_listener_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = install(token.clone()).unwrap();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener should stop")
            .unwrap();
    }
}
