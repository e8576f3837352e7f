//! Rule catalog and script evaluator.
//!
//! This crate provides:
//! - typed rule variants (threshold, single, pattern, flexible) with a JSON
//!   codec that round-trips unrecognized members verbatim
//! - per-file persistence (`{name}.rule`, atomic replace) with a startup
//!   directory scan
//! - catalog indexes by name, by consumed metric topic, and by asset
//! - a sandboxed script evaluator for rule bodies

pub mod catalog;
pub mod error;
pub mod schema;
pub mod script;

pub use catalog::{CatalogEntry, LoadStatus, RuleCatalog};
pub use error::RuleError;
pub use schema::{Outcome, Rule, RuleKind};
pub use script::{OutcomeToken, RuleScript, ScriptError};
