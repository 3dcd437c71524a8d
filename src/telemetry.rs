use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::configuration::TelemetrySettings;

/// Initialize structured logging.
///
/// The level is controlled by `RUST_LOG` (default `info`). Logs go to stderr
/// so they do not interleave with the console's own output on stdout.
pub fn init_telemetry(settings: &TelemetrySettings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if settings.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    }
}
