//! Process lifecycle helpers: status logging and shutdown signals.

use tokio::sync::watch;
use tracing::{info, warn};

/// Log every change of the coordinator's started flag until the sender is
/// dropped. Returns the number of changes observed.
pub async fn log_status_changes(mut started: watch::Receiver<bool>) -> usize {
    let mut changes = 0;
    while started.changed().await.is_ok() {
        let now = *started.borrow_and_update();
        changes += 1;
        info!(started = now, "Trace status changed");
    }
    changes
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Cannot install signal handlers, falling back to Ctrl+C");
                    wait_for_ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
