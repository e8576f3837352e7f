use thiserror::Error;

/// Errors raised while decoding stream payloads into model types.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Metric value could not be parsed as a finite number.
    #[error("non-numeric metric value: {0:?}")]
    NonNumericValue(String),

    /// A required payload field was empty or missing.
    #[error("missing payload field: {0}")]
    MissingField(&'static str),

    /// Unknown asset operation string.
    #[error("unknown asset operation: {0:?}")]
    UnknownOperation(String),
}
