use tracing_subscriber::EnvFilter;

use crate::{config::LoggingConfig, TrainingError};

#[derive(Clone, Debug)]
pub struct LoggingSettings {
    pub enable_stdout: bool,
    pub filter: String,
}

impl LoggingSettings {
    pub fn from_config(config: &LoggingConfig) -> Self {
        let filter = config.filter.trim();
        Self {
            enable_stdout: config.enable_stdout,
            filter: if filter.is_empty() {
                "info".to_string()
            } else {
                filter.to_string()
            },
        }
    }

    /// `RUST_LOG` when set and valid, otherwise the configured filter.
    pub fn env_filter(&self) -> Result<EnvFilter, TrainingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.filter).map_err(|err| {
            TrainingError::initialization(format!(
                "invalid log filter '{}': {err}",
                self.filter
            ))
        })
    }
}

/// Installs the global fmt subscriber on stdout.
///
/// Returns `Ok(false)` when stdout logging is disabled or a subscriber was
/// already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<bool, TrainingError> {
    if !settings.enable_stdout {
        return Ok(false);
    }

    let filter = settings.env_filter()?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filter_falls_back_to_info() {
        let config = LoggingConfig {
            enable_stdout: true,
            filter: "  ".to_string(),
        };
        let settings = LoggingSettings::from_config(&config);
        assert_eq!(settings.filter, "info");
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let settings = LoggingSettings {
            enable_stdout: false,
            filter: "debug".to_string(),
        };
        assert!(!init_logging(&settings).unwrap());
    }
}
