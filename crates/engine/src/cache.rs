//! Cache of the latest metric sample per topic.

use std::collections::HashMap;

use sentinel_core::MetricSample;

/// Latest-sample cache with stale-entry eviction.
///
/// The last inserted topic is tracked separately: the dispatcher reads the
/// sample that triggered the current evaluation pass back through
/// [`MetricCache::last`] after the eviction pass has run.
#[derive(Default)]
pub struct MetricCache {
    metrics: HashMap<String, MetricSample>,
    last_topic: Option<String>,
}

impl MetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the sample for its topic.
    pub fn insert(&mut self, sample: MetricSample) {
        let topic = sample.topic();
        self.metrics.insert(topic.clone(), sample);
        self.last_topic = Some(topic);
    }

    /// Drop every entry whose TTL has lapsed.
    pub fn purge_stale(&mut self, now_s: u64) {
        self.metrics.retain(|_, m| m.is_fresh(now_s));
    }

    /// Remove one topic outright (metric-unavailable signal).
    pub fn remove(&mut self, topic: &str) {
        self.metrics.remove(topic);
    }

    /// Fresh sample for a topic, if any.
    pub fn get(&self, topic: &str, now_s: u64) -> Option<&MetricSample> {
        self.metrics.get(topic).filter(|m| m.is_fresh(now_s))
    }

    /// Value lookup; NaN when the topic is missing or stale.
    pub fn find(&self, topic: &str, now_s: u64) -> f64 {
        self.get(topic, now_s).map(|m| m.value).unwrap_or(f64::NAN)
    }

    /// The most recently inserted sample, `None` once eviction took it.
    pub fn last(&self) -> Option<&MetricSample> {
        self.last_topic.as_deref().and_then(|t| self.metrics.get(t))
    }

    /// Iterate over all cached samples.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(metric_type: &str, element: &str, value: f64, ts: u64, ttl: u32) -> MetricSample {
        MetricSample {
            element: element.into(),
            metric_type: metric_type.into(),
            unit: "C".into(),
            value,
            timestamp_s: ts,
            ttl_s: ttl,
        }
    }

    #[test]
    fn newer_sample_replaces_older() {
        let mut cache = MetricCache::new();
        cache.insert(sample("abc", "fff", 1.0, 10, 60));
        cache.insert(sample("abc", "fff", 2.0, 20, 60));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find("abc@fff", 20), 2.0);
    }

    #[test]
    fn stale_entries_read_as_nan_and_purge() {
        let mut cache = MetricCache::new();
        cache.insert(sample("abc", "fff", 1.0, 10, 5));
        assert_eq!(cache.find("abc@fff", 15), 1.0);
        assert!(cache.find("abc@fff", 16).is_nan());
        cache.purge_stale(16);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_topic_reads_as_nan() {
        let cache = MetricCache::new();
        assert!(cache.find("no@where", 0).is_nan());
    }

    #[test]
    fn last_tracks_most_recent_insert() {
        let mut cache = MetricCache::new();
        cache.insert(sample("abc", "fff", 1.0, 10, 60));
        cache.insert(sample("xyz", "ggg", 2.0, 11, 60));
        assert_eq!(cache.last().unwrap().topic(), "xyz@ggg");
    }

    #[test]
    fn last_is_gone_once_evicted() {
        let mut cache = MetricCache::new();
        cache.insert(sample("abc", "fff", 1.0, 10, 5));
        cache.purge_stale(100);
        assert!(cache.last().is_none());
    }
}
