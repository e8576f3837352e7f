use thiserror::Error;

/// Errors raised by rule parsing, validation and catalog mutations.
///
/// The first four variants map one-to-one onto mailbox error codes.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Structural parse failure, missing required field, non-numeric value.
    #[error("bad rule json: {0}")]
    BadJson(String),

    /// Script failed to compile or does not define `main`.
    #[error("bad rule script: {0}")]
    BadScript(String),

    /// A rule with this name is already present.
    #[error("rule already exists: {0}")]
    AlreadyExists(String),

    /// Named rule is absent from the catalog.
    #[error("rule not found: {0}")]
    NotFound(String),

    /// A flexible rule without a bound asset cannot be added directly.
    #[error("rule can't be directly instantiated")]
    NotInstantiable,

    /// Persistence failure; surfaced as an internal error on the mailbox.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
