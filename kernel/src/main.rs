//! Kill-switch host process.

use anyhow::Context;
use branch_killswitch::infrastructure::{audit, config::Settings, telemetry::TelemetryBuilder};
use branch_killswitch::Coordinator;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new().context("Failed to load configuration")?;

    TelemetryBuilder::from_settings(&config.telemetry, env!("CARGO_PKG_VERSION"))
        .init()
        .context("Failed to initialize telemetry")?;

    info!("Kill-switch starting...");
    audit::log_audit(&audit::AuditEvent::SystemStartup {
        component: "Coordinator".into(),
    });

    let coordinator = Coordinator::from_settings(&config);
    info!(
        backend = ?config.cancellation.backend,
        branch_kill_timeout_ms = config.kill_switch.branch_kill_timeout_ms,
        cascade_timeout_multiplier = config.kill_switch.cascade_timeout_multiplier,
        default_mode = %config.kill_switch.default_mode,
        "Kill-switch initialized. Waiting for shutdown signal..."
    );

    shutdown_signal().await;

    info!("Shutdown signal received, cleaning up...");
    let stats = coordinator.stats();
    info!(
        total_kills = stats.total_kills,
        degraded_kills = stats.degraded_kills,
        branches = coordinator.branches().len(),
        "Final kill statistics"
    );
    coordinator.clear_cancellations();
    audit::log_audit(&audit::AuditEvent::SystemShutdown {
        reason: "Signal received".into(),
    });

    info!("Kill-switch shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
