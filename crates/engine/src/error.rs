use thiserror::Error;

/// Engine-level failures surfaced by the worker loops.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Bus(#[from] sentinel_bus::BusError),

    #[error(transparent)]
    Rule(#[from] sentinel_rules::RuleError),

    #[error("envelope error: {0}")]
    Envelope(String),
}
