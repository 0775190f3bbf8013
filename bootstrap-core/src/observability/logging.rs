use crate::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt};
use std::sync::OnceLock;

static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once; later calls are no-ops.
pub fn setup_logging(format: LogFormat) {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let json_layer = (format == LogFormat::Json).then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
        });

        let fmt_layer = (format == LogFormat::Text).then(|| {
            fmt::layer()
                .with_target(true)
        });

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(fmt_layer)
            .try_init();
    });
}

#[macro_export]
macro_rules! log_step {
    ($level:ident, $step:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "bootstrap",
            step = $step,
            $($arg)*
        );
    };
}
