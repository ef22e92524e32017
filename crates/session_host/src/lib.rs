//! # Session Host
//!
//! Process shell around one hosted game session. Handles CLI parsing,
//! configuration loading, logging and the session lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (creates session_host.toml if missing)
//! session_host
//!
//! # Override the advertised port and log level
//! session_host --config prod.toml --port 7777 --log-level debug --json-logs
//! ```
//!
//! On SIGINT/SIGTERM the session is destroyed, the backend is notified and
//! final statistics are logged. A second signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

pub use app::Application;
pub use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings, SessionSection};

/// Runs the session host until shutdown.
///
/// Must be called from within a Tokio runtime.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {e}", args.config_path.display());
            std::process::exit(1);
        }
    };
    config.apply_cli(&args);

    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(config) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
