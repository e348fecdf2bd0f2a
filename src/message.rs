// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Messages
//!
//! This module defines the message entity exchanged with the broker. A message
//! carries its payload, the routing metadata it was published or delivered
//! with, and the delivery tag that correlates a fetched message with its later
//! ack or nack.

use crate::{errors::AmqpError, otel};
use opentelemetry::Context;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use tracing::error;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Header values supported by the wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    ShortString(String),
    LongString(String),
    Int(i16),
    LongInt(i32),
    LongLongInt(i64),
    Uint(u32),
    Bool(bool),
}

/// Message headers, keyed by header name.
pub type Headers = BTreeMap<String, HeaderValue>;

/// Basic properties attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub message_id: Option<String>,
    pub kind: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    /// 1 for transient, 2 for persistent
    pub delivery_mode: Option<u8>,
    pub headers: Headers,
}

impl MessageProperties {
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_owned());
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_owned());
        self
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_owned());
        self
    }

    pub fn reply_to(mut self, queue: &str) -> Self {
        self.reply_to = Some(queue.to_owned());
        self
    }

    /// Marks the message as persistent, surviving broker restarts on durable queues.
    pub fn persistent(mut self) -> Self {
        self.delivery_mode = Some(2);
        self
    }

    pub fn header(mut self, key: &str, value: HeaderValue) -> Self {
        self.headers.insert(key.to_owned(), value);
        self
    }
}

/// A single broker message.
///
/// Messages built for publishing only need a routing key, a body, and
/// optionally properties. Messages returned by a fetch also carry the
/// delivery tag, the exchange they were published to, the redelivered flag,
/// and the number of messages left in the queue at fetch time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message_count: u32,
    pub properties: MessageProperties,
}

impl Message {
    /// Creates a message to be published with the given routing key.
    pub fn new(routing_key: &str, body: impl Into<Vec<u8>>) -> Message {
        Message {
            routing_key: routing_key.to_owned(),
            body: body.into(),
            ..Message::default()
        }
    }

    /// Creates a message whose body is the JSON encoding of `payload`.
    pub fn json<T>(routing_key: &str, payload: &T) -> Result<Message, AmqpError>
    where
        T: Serialize,
    {
        let body = serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::SerializePayloadError
        })?;

        Ok(Message::new(routing_key, body)
            .properties(MessageProperties::default().content_type(JSON_CONTENT_TYPE)))
    }

    /// Sets the message properties.
    pub fn properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Decodes the body as JSON.
    pub fn decode_json<T>(&self) -> Result<T, AmqpError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(|err| {
            error!(error = err.to_string(), "failure to parse payload");
            AmqpError::ParsePayloadError
        })
    }

    /// Extracts the trace context propagated in the message headers.
    pub fn context(&self) -> Context {
        otel::extract_context(&self.properties.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Order {
        id: u32,
        item: String,
    }

    #[test]
    fn json_sets_content_type_and_encodes_body() {
        let order = Order {
            id: 7,
            item: "book".to_owned(),
        };

        let msg = Message::json("orders.created", &order).unwrap();

        assert_eq!(msg.routing_key, "orders.created");
        assert_eq!(
            msg.properties.content_type.as_deref(),
            Some(JSON_CONTENT_TYPE)
        );
        assert_eq!(msg.decode_json::<Order>().unwrap(), order);
    }

    #[test]
    fn decode_json_reports_invalid_payload() {
        let msg = Message::new("k", b"not json".to_vec());

        assert_eq!(
            msg.decode_json::<Order>().unwrap_err(),
            AmqpError::ParsePayloadError
        );
    }

    #[test]
    fn properties_builder() {
        let props = MessageProperties::default()
            .kind("OrderCreated")
            .correlation_id("c-1")
            .reply_to("replies")
            .persistent()
            .header("tenant", HeaderValue::ShortString("a".to_owned()));

        assert_eq!(props.kind.as_deref(), Some("OrderCreated"));
        assert_eq!(props.delivery_mode, Some(2));
        assert_eq!(
            props.headers.get("tenant"),
            Some(&HeaderValue::ShortString("a".to_owned()))
        );
    }
}
