//! Stream names and well-known subjects.

/// Metric samples, subject `"{type}@{element}"`.
pub const STREAM_METRICS: &str = "METRICS";

/// Metric-unavailable signals, frames `["METRICUNAVAILABLE", topic]`.
pub const STREAM_METRICS_UNAVAILABLE: &str = "METRICS_UNAVAILABLE";

/// Asset lifecycle events.
pub const STREAM_ASSETS: &str = "ASSETS";

/// Alert messages, subject `"{rule}/{severity}@{element}"`.
pub const STREAM_ALERTS: &str = "ALERTS";

/// Mailbox subject of the rule-catalog RPC.
pub const RULES_SUBJECT: &str = "rfc-evaluator-rules";

/// First frame of a metric-unavailable signal.
pub const METRIC_UNAVAILABLE_FRAME: &str = "METRICUNAVAILABLE";
