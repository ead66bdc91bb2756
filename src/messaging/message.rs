//! # Message Structures
//!
//! Inbound deliveries as handed to the worker by the broker client, outbound
//! records handed back to it for publishing, and the typed header values the
//! resilience layer reads from them.

use crate::constants::headers;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::warn;

/// Ordered string-to-string header mapping
///
/// Keys are unique; inserting an existing key replaces its value in place so
/// the original ordering of the headers is retained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    entries: Vec<(String, String)>,
}

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MessageHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = MessageHeaders::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

impl Serialize for MessageHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MessageHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = MessageHeaders;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of string headers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers = MessageHeaders::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    headers.insert(key, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// Number of times a logical event has already been redelivered
///
/// Parsed once at the message boundary. Missing or unparsable header values
/// become zero rather than failing the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryCount(u32);

impl RetryCount {
    pub const ZERO: RetryCount = RetryCount(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Parse a raw `retryCount` header value
    pub fn from_header(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::ZERO,
            Some(value) => match value.parse::<u32>() {
                Ok(count) => Self(count),
                Err(e) => {
                    warn!(
                        raw_value = %value,
                        error = %e,
                        "Unparsable retryCount header, treating as 0"
                    );
                    Self::ZERO
                }
            },
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Count for the next delivery of the same event
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Whether this delivery has used up the retry budget
    pub fn is_exhausted(self, max_retries: u32) -> bool {
        self.0 >= max_retries
    }
}

impl fmt::Display for RetryCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivery of a message from an assigned partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    /// Monotonic per partition; opaque to the resilience layer
    pub offset: i64,
    /// Partition key, preserved on every record derived from this message
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: MessageHeaders,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: value.into(),
            headers: MessageHeaders::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_headers(mut self, headers: MessageHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// The event id, or `None` when absent or blank
    pub fn event_id(&self) -> Option<&str> {
        self.headers
            .get(headers::EVENT_ID)
            .filter(|id| !id.trim().is_empty())
    }

    pub fn retry_count(&self) -> RetryCount {
        RetryCount::from_header(self.headers.get(headers::RETRY_COUNT))
    }

    /// Copy of this message as it would be redelivered, carrying `retry_count`
    pub fn redelivery(&self, retry_count: RetryCount) -> Self {
        let mut next = self.clone();
        next.headers
            .insert(headers::RETRY_COUNT, retry_count.to_string());
        next
    }

    pub fn value_utf8_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    pub fn key_utf8_lossy(&self) -> Option<String> {
        self.key
            .as_ref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
    }
}

/// A record to be published by the broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: MessageHeaders,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: value.into(),
            headers: MessageHeaders::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_optional_key(mut self, key: Option<Vec<u8>>) -> Self {
        self.key = key;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Serialize `payload` as JSON into a new record
    pub fn json<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_vec(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_preserve_order_on_replace() {
        let mut headers = MessageHeaders::new();
        headers.insert("eventId", "evt-1");
        headers.insert("retryCount", "0");
        headers.insert("eventType", "OrderCreated");

        let previous = headers.insert("retryCount", "1");
        assert_eq!(previous.as_deref(), Some("0"));

        let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["eventId", "retryCount", "eventType"]);
        assert_eq!(headers.get("retryCount"), Some("1"));
    }

    #[test]
    fn test_headers_serialize_as_ordered_map() {
        let headers: MessageHeaders = [("b", "2"), ("a", "1")].into_iter().collect();
        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"b":"2","a":"1"}"#);

        let parsed: MessageHeaders = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, headers);
    }

    #[test]
    fn test_retry_count_parsing() {
        assert_eq!(RetryCount::from_header(None), RetryCount::ZERO);
        assert_eq!(RetryCount::from_header(Some("")), RetryCount::ZERO);
        assert_eq!(RetryCount::from_header(Some(" 2 ")), RetryCount::new(2));
        assert_eq!(RetryCount::from_header(Some("abc")), RetryCount::ZERO);
        assert_eq!(RetryCount::from_header(Some("-1")), RetryCount::ZERO);
    }

    #[test]
    fn test_retry_count_exhaustion() {
        assert!(!RetryCount::new(2).is_exhausted(3));
        assert!(RetryCount::new(3).is_exhausted(3));
        assert!(RetryCount::new(4).is_exhausted(3));
        assert_eq!(RetryCount::new(u32::MAX).next(), RetryCount::new(u32::MAX));
    }

    #[test]
    fn test_event_id_blank_is_unknown() {
        let message = InboundMessage::new("orders.created", 0, 7, b"{}".to_vec());
        assert_eq!(message.event_id(), None);

        let message = message.with_header("eventId", "   ");
        assert_eq!(message.event_id(), None);

        let message = message.with_header("eventId", "evt-1");
        assert_eq!(message.event_id(), Some("evt-1"));
    }

    #[test]
    fn test_redelivery_increments_header_only() {
        let message = InboundMessage::new("orders.created", 1, 10, b"{}".to_vec())
            .with_key("order-1")
            .with_header("eventId", "evt-1");

        let redelivered = message.redelivery(message.retry_count().next());
        assert_eq!(redelivered.retry_count(), RetryCount::new(1));
        assert_eq!(redelivered.key, message.key);
        assert_eq!(redelivered.offset, message.offset);
        assert_eq!(message.retry_count(), RetryCount::ZERO);
    }
}
