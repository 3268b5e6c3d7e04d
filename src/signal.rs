use tokio_util::sync::CancellationToken;

#[cfg(target_family = "unix")]
use tokio::signal::unix::SignalKind;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(target_family = "unix")]
    let second_signal = async {
        match (
            tokio::signal::unix::signal(SignalKind::terminate()),
            tokio::signal::unix::signal(SignalKind::quit()),
        ) {
            (Ok(mut terminate), Ok(mut quit)) => {
                tokio::select! {
                    _ = terminate.recv() => (),
                    _ = quit.recv() => (),
                }
            }
            _ => {
                tracing::error!("Failed to install unix signal handlers");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(target_family = "unix"))]
    let second_signal = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => (),
        () = second_signal => (),
    }
}

/// Token cancelled on the first ctrl-c, SIGTERM or SIGQUIT.
#[must_use]
pub fn shutdown() -> CancellationToken {
    let token = CancellationToken::new();

    {
        let token = token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            token.cancel();
        });
    }

    token
}
