//! Quality Panel core library
//!
//! Monthly reporting periods per hospital sector, the lifecycle that locks
//! their indicator data, and cumulative panel reports over date ranges.

pub mod cancel;
pub mod core;
pub mod db;
pub mod error;
pub mod models;
pub mod panel;
pub mod telemetry;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::{PanelError, Result};
pub use panel::{CumulativeRequest, PanelOptions, QualityPanel};

/// Application configuration
pub mod config {
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    pub struct Config {
        pub database: DatabaseConfig,
        pub reports: ReportsConfig,
        pub logging: LoggingConfig,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct DatabaseConfig {
        pub url: String,
        pub max_connections: u32,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ReportsConfig {
        pub max_concurrent_builds: usize,
        pub observation_separator: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct LoggingConfig {
        /// `EnvFilter` directives; `RUST_LOG` takes precedence.
        pub filter: String,
        pub json: bool,
    }

    /// Load configuration from defaults, files and `PANEL__*` variables
    pub fn load_config() -> Result<Config, config::ConfigError> {
        let env = std::env::var("PANEL_ENV").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .set_default("database.url", "sqlite://quality-panel.db")?
            .set_default("database.max_connections", 5)?
            .set_default("reports.max_concurrent_builds", 4)?
            .set_default("reports.observation_separator", "\n---\n")?
            .set_default("logging.filter", "info")?
            .set_default("logging.json", false)?
            // Start with default settings
            .add_source(config::File::with_name("config/default").required(false))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables, e.g. PANEL__DATABASE__URL
            .add_source(config::Environment::with_prefix("PANEL").prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_are_complete() {
            let config = load_config().unwrap();
            assert!(config.database.url.starts_with("sqlite:"));
            assert!(config.reports.max_concurrent_builds > 0);
            assert_eq!(config.reports.observation_separator, "\n---\n");
        }
    }
}
