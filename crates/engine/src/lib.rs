//! Alert-state engine.
//!
//! Owns the metric cache and the alert store, and drives rule evaluation on
//! three inputs: metric samples, metric-unavailable signals, and mailbox
//! requests. Alerts are coalesced per (rule, element) and only emitted when
//! something observable changed.

pub mod alert;
pub mod cache;
pub mod error;
pub mod protocol;
pub mod service;
pub mod store;
pub mod worker;

pub use alert::Alert;
pub use cache::MetricCache;
pub use error::EngineError;
pub use service::EngineService;
pub use store::AlertStore;
