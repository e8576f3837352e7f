use thiserror::Error;

/// Autoconfigurator failures.
#[derive(Debug, Error)]
pub enum AutoconfigError {
    #[error("state file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Bus(#[from] sentinel_bus::BusError),
}
