//! Autoconfigurator.
//!
//! Watches the ASSETS stream, instantiates rule templates for active assets
//! by token substitution, routes the resulting rules to the alert engine, and
//! keeps a state file of which assets are already configured.

pub mod asset;
pub mod error;
pub mod phases;
pub mod service;
pub mod state;
pub mod templates;
pub mod worker;

pub use asset::AssetInfo;
pub use error::AutoconfigError;
pub use service::{AssetAction, Autoconfigurator, PendingRules};
pub use templates::TemplateStore;
