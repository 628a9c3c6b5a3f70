use std::process::ExitCode;
use syncbridge_syncd::{config::SyncdConfig, daemon};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,syncbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match SyncdConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        vendor = config.vendor.vendor(),
        environment = %config.environment,
        "Loaded configuration"
    );

    match daemon::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!(error = %report, "synchronization run failed");
            ExitCode::FAILURE
        }
    }
}
