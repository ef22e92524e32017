//! Logging setup for the session host.
//!
//! The configured level applies to the session crates; everything else is
//! held at `warn`. `RUST_LOG` replaces the whole filter when it is set.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Crates whose log level follows `logging.level`.
const SESSION_TARGETS: [&str; 3] = ["session_handling", "session_host", "lib_session_host"];

fn default_directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for target in SESSION_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Installs the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn setup_logging(config: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.json_format {
        fmt::layer().json().with_thread_names(true).boxed()
    } else {
        fmt::layer().with_target(false).with_thread_names(true).boxed()
    };

    tracing_subscriber::registry().with(output).with(filter).try_init()?;

    info!(
        "🔧 Logging at {} as {}",
        config.level,
        if config.json_format { "json" } else { "text" }
    );
    Ok(())
}

pub fn display_banner() {
    info!(
        "🎮 session_host v{}: reservation-checked joins, backend-synchronized teardown",
        env!("CARGO_PKG_VERSION")
    );
}
