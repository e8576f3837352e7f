use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire-format message envelope for everything crossing the broker.
///
/// Messages are serialized with MessagePack for compact, fast transport.
/// The `subject` field is the routing key (a metric topic, an alert subject,
/// or a mailbox subject such as `rfc-evaluator-rules`); `sender` names the
/// originating agent for logging and reply addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Routing subject (e.g. `"temperature.default@rack-3"`).
    pub subject: String,

    /// Agent name of the sender (e.g. `"alert-engine"`).
    pub sender: String,

    /// MessagePack-encoded payload bytes.
    #[serde(with = "raw_bytes")]
    pub payload: Vec<u8>,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    /// Correlation ID for request-reply matching.
    pub correlation_id: Uuid,
}

impl Message {
    /// Create a new message, serializing the payload with MessagePack.
    pub fn new<T: Serialize>(
        subject: impl Into<String>,
        sender: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            subject: subject.into(),
            sender: sender.into(),
            payload: rmp_serde::to_vec(payload)?,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
        })
    }

    /// Create a message whose payload is a plain frame list.
    ///
    /// Mailbox requests and replies, metric-unavailable signals and control
    /// frames all travel this way.
    pub fn frames(
        subject: impl Into<String>,
        sender: impl Into<String>,
        frames: &[String],
    ) -> Result<Self, rmp_serde::encode::Error> {
        Self::new(subject, sender, &frames.to_vec())
    }

    /// Create a reply sharing the request's correlation ID.
    pub fn reply_to<T: Serialize>(
        request: &Message,
        sender: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            subject: request.subject.clone(),
            sender: sender.into(),
            payload: rmp_serde::to_vec(payload)?,
            timestamp: Utc::now(),
            correlation_id: request.correlation_id,
        })
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Decode a frame-list payload.
    pub fn decode_frames(&self) -> Result<Vec<String>, rmp_serde::decode::Error> {
        self.decode()
    }

    /// Serialize this entire envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::MetricPayload;

    #[test]
    fn roundtrip_typed_payload() {
        let metric = MetricPayload {
            metric_type: "abc".into(),
            element_src: "fff".into(),
            value: "42".into(),
            unit: "C".into(),
            ttl: 60,
            time: None,
        };
        let msg = Message::new("abc@fff", "test-producer", &metric).unwrap();
        let decoded: MetricPayload = msg.decode().unwrap();
        assert_eq!(decoded.value, "42");
        assert_eq!(msg.subject, "abc@fff");
    }

    #[test]
    fn roundtrip_envelope_bytes() {
        let msg = Message::frames(
            "rfc-evaluator-rules",
            "ui",
            &["LIST".to_string(), "all".to_string(), String::new()],
        )
        .unwrap();
        let bytes = msg.to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.correlation_id, msg.correlation_id);
        assert_eq!(decoded.decode_frames().unwrap(), vec!["LIST", "all", ""]);
    }

    #[test]
    fn reply_shares_correlation_id() {
        let req = Message::frames("rfc-evaluator-rules", "ui", &["GET".into(), "r".into()]).unwrap();
        let reply = Message::reply_to(&req, "alert-engine", &vec!["OK".to_string()]).unwrap();
        assert_eq!(reply.correlation_id, req.correlation_id);
        assert_eq!(reply.subject, req.subject);
    }
}
