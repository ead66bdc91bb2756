//! Test message builders

use resilient_consumer::messaging::InboundMessage;

use super::ORDERS_TOPIC;

/// Builder pattern for creating inbound order deliveries
pub struct OrderMessageBuilder {
    partition: i32,
    offset: i64,
    key: Option<String>,
    event_id: Option<String>,
    retry_count: Option<String>,
    value: Vec<u8>,
}

impl Default for OrderMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderMessageBuilder {
    pub fn new() -> Self {
        Self {
            partition: 0,
            offset: 0,
            key: Some("order-1".to_string()),
            event_id: Some("evt-1".to_string()),
            retry_count: Some("0".to_string()),
            value: br#"{"orderId":"order-1","userId":"user-1","amount":42.0}"#.to_vec(),
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn without_key(mut self) -> Self {
        self.key = None;
        self
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn without_event_id(mut self) -> Self {
        self.event_id = None;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count.to_string());
        self
    }

    /// Raw header value, for exercising unparsable counters
    pub fn with_raw_retry_count(mut self, raw: &str) -> Self {
        self.retry_count = Some(raw.to_string());
        self
    }

    pub fn with_value(mut self, value: &[u8]) -> Self {
        self.value = value.to_vec();
        self
    }

    pub fn build(self) -> InboundMessage {
        let mut message = InboundMessage::new(ORDERS_TOPIC, self.partition, self.offset, self.value)
            .with_header("eventType", "OrderCreated");
        if let Some(key) = self.key {
            message = message.with_key(key.into_bytes());
        }
        if let Some(event_id) = self.event_id {
            message = message.with_header("eventId", event_id);
        }
        if let Some(retry_count) = self.retry_count {
            message = message.with_header("retryCount", retry_count);
        }
        message
    }
}

/// Order delivery with the given event id and retry count
pub fn order_message(event_id: &str, retry_count: u32) -> InboundMessage {
    OrderMessageBuilder::new()
        .with_event_id(event_id)
        .with_retry_count(retry_count)
        .build()
}
