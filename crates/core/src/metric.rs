//! Metric samples, topics, and the METRICS stream payload.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Format the routing topic for a metric: `"{type}@{element}"`.
pub fn metric_topic(metric_type: &str, element: &str) -> String {
    format!("{}@{}", metric_type, element)
}

/// One numeric measurement describing an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Element (asset) the measurement describes.
    pub element: String,
    /// Measurement type, e.g. `temperature.default`.
    pub metric_type: String,
    /// Unit string, e.g. `C` or `%`.
    pub unit: String,
    pub value: f64,
    /// Wall-clock time the sample was taken, seconds.
    pub timestamp_s: u64,
    /// Seconds the sample stays usable after `timestamp_s`.
    pub ttl_s: u32,
}

impl MetricSample {
    pub fn topic(&self) -> String {
        metric_topic(&self.metric_type, &self.element)
    }

    /// A sample is fresh while `now - timestamp <= ttl`.
    pub fn is_fresh(&self, now_s: u64) -> bool {
        now_s.saturating_sub(self.timestamp_s) <= u64::from(self.ttl_s)
    }
}

/// Wire payload of a METRICS stream message.
///
/// The value travels as a string; decoding rejects anything that does not
/// parse as a finite number. The optional `time` mirrors the aux timestamp of
/// the source protocol and defaults to the receiver's clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPayload {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub element_src: String,
    pub value: String,
    pub unit: String,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
}

impl MetricPayload {
    /// Subject this payload is published under.
    pub fn topic(&self) -> String {
        metric_topic(&self.metric_type, &self.element_src)
    }

    /// Decode into a [`MetricSample`], defaulting the timestamp to `now_s`.
    pub fn into_sample(self, now_s: u64) -> Result<MetricSample, ModelError> {
        if self.element_src.is_empty() {
            return Err(ModelError::MissingField("element_src"));
        }
        if self.metric_type.is_empty() {
            return Err(ModelError::MissingField("type"));
        }
        let value: f64 = self
            .value
            .trim()
            .parse()
            .map_err(|_| ModelError::NonNumericValue(self.value.clone()))?;
        if !value.is_finite() {
            return Err(ModelError::NonNumericValue(self.value));
        }
        Ok(MetricSample {
            element: self.element_src,
            metric_type: self.metric_type,
            unit: self.unit,
            value,
            timestamp_s: self.time.unwrap_or(now_s),
            ttl_s: self.ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: &str) -> MetricPayload {
        MetricPayload {
            metric_type: "abc".into(),
            element_src: "fff".into(),
            value: value.into(),
            unit: "C".into(),
            ttl: 60,
            time: None,
        }
    }

    #[test]
    fn topic_is_type_at_element() {
        assert_eq!(payload("1").topic(), "abc@fff");
        let sample = payload("1").into_sample(10).unwrap();
        assert_eq!(sample.topic(), "abc@fff");
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(payload("forty-two").into_sample(0).is_err());
        assert!(payload("nan").into_sample(0).is_err());
        assert!(payload("inf").into_sample(0).is_err());
        assert_eq!(payload(" 42.5 ").into_sample(0).unwrap().value, 42.5);
    }

    #[test]
    fn freshness_window_is_inclusive() {
        let sample = payload("1").into_sample(100).unwrap();
        assert!(sample.is_fresh(100));
        assert!(sample.is_fresh(160));
        assert!(!sample.is_fresh(161));
    }

    #[test]
    fn explicit_time_wins_over_receiver_clock() {
        let mut p = payload("1");
        p.time = Some(77);
        assert_eq!(p.into_sample(100).unwrap().timestamp_s, 77);
    }
}
