// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Management
//!
//! This module implements the broker client capabilities on top of lapin. It
//! establishes connections to the RabbitMQ server, opens channels with
//! publisher confirms enabled, and maps every message operation onto the
//! corresponding lapin call.

use crate::{
    client::{BrokerChannel, BrokerConnection, ConnectionFactory},
    errors::AmqpError,
    message::{HeaderValue, Headers, Message, MessageProperties},
    otel,
    settings::Settings,
};
use async_trait::async_trait;
use lapin::{
    message::BasicGetMessage,
    options::{
        BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::{
        AMQPValue, FieldTable, LongInt, LongLongInt, LongString, LongUInt, ShortInt, ShortString,
    },
    publisher_confirm::{Confirmation, PublisherConfirm},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use opentelemetry::Context;
use std::{collections::BTreeMap, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

const REPLY_SUCCESS: u16 = 200;

/// Opens lapin connections.
#[derive(Debug, Default, Clone)]
pub struct LapinConnectionFactory;

impl LapinConnectionFactory {
    pub fn new() -> LapinConnectionFactory {
        LapinConnectionFactory
    }
}

#[async_trait]
impl ConnectionFactory for LapinConnectionFactory {
    async fn create_connection(&self, settings: &Settings) -> Option<Box<dyn BrokerConnection>> {
        debug!("creating amqp connection...");
        let mut options = ConnectionProperties::default();
        if let Some(name) = &settings.connection_name {
            options = options.with_connection_name(LongString::from(name.clone()));
        }

        match Connection::connect_uri(settings.amqp_uri(), options).await {
            Ok(conn) => {
                debug!("amqp connected");
                Some(Box::new(LapinConnection::new(conn)))
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    host = %settings.hostname,
                    port = settings.port,
                    "failure to connect"
                );
                None
            }
        }
    }
}

/// A lapin connection. Reports closed once disposed.
pub struct LapinConnection {
    conn: Option<Connection>,
}

impl LapinConnection {
    pub fn new(conn: Connection) -> LapinConnection {
        LapinConnection { conn: Some(conn) }
    }

    fn conn(&self) -> Result<&Connection, AmqpError> {
        self.conn.as_ref().ok_or(AmqpError::ConnectionError)
    }
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    fn is_open(&self) -> bool {
        self.conn
            .as_ref()
            .map(|conn| conn.status().connected())
            .unwrap_or(false)
    }

    async fn create_channel(&self) -> Option<Box<dyn BrokerChannel>> {
        let conn = self.conn().ok()?;

        debug!("creating amqp channel...");
        let channel = match conn.create_channel().await {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                return None;
            }
        };

        if let Err(err) = channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
        {
            error!(error = err.to_string(), "error to enable publisher confirms");
            return None;
        }

        debug!("channel created");
        Some(Box::new(LapinChannel::new(channel)))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        match self.conn()?.close(REPLY_SUCCESS, "OK").await {
            Err(err) => {
                error!(error = err.to_string(), "error to close the connection");
                Err(AmqpError::CloseConnectionError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn dispose(&mut self) {
        if self.conn.take().is_some() {
            debug!("connection released");
        }
    }
}

/// A lapin channel. Reports closed once disposed.
///
/// Confirms of published messages are kept until the next wait for confirms.
pub struct LapinChannel {
    channel: Option<Channel>,
    pending: Mutex<Vec<PublisherConfirm>>,
}

impl LapinChannel {
    pub fn new(channel: Channel) -> LapinChannel {
        LapinChannel {
            channel: Some(channel),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn channel(&self) -> Result<&Channel, AmqpError> {
        self.channel.as_ref().ok_or(AmqpError::ChannelError)
    }
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    fn is_open(&self) -> bool {
        self.channel
            .as_ref()
            .map(|channel| channel.status().connected())
            .unwrap_or(false)
    }

    async fn close(&self) -> Result<(), AmqpError> {
        match self.channel()?.close(REPLY_SUCCESS, "OK").await {
            Err(err) => {
                error!(error = err.to_string(), "error to close the channel");
                Err(AmqpError::CloseChannelError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn dispose(&mut self) {
        if self.channel.take().is_some() {
            debug!("channel released");
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        properties: &MessageProperties,
        payload: &[u8],
    ) -> Result<(), AmqpError> {
        match self
            .channel()?
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory,
                },
                payload,
                basic_properties(properties, &Context::current()),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            Ok(confirm) => {
                self.pending.lock().await.push(confirm);
                Ok(())
            }
        }
    }

    async fn get(&self, queue: &str, auto_ack: bool) -> Result<Option<Message>, AmqpError> {
        match self
            .channel()?
            .basic_get(queue, BasicGetOptions { no_ack: auto_ack })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), queue = queue, "error getting message");
                Err(AmqpError::GetMessageError(queue.to_owned()))
            }
            Ok(got) => Ok(got.as_ref().map(message_from_delivery)),
        }
    }

    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), AmqpError> {
        match self
            .channel()?
            .basic_ack(delivery_tag, BasicAckOptions { multiple })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling ack msg");
                Err(AmqpError::AckMessageError)
            }
            _ => Ok(()),
        }
    }

    async fn nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> Result<(), AmqpError> {
        match self
            .channel()?
            .basic_nack(delivery_tag, BasicNackOptions { multiple, requeue })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling nack msg");
                Err(AmqpError::NackMessageError)
            }
            _ => Ok(()),
        }
    }

    async fn wait_for_confirms(&self, timeout: Duration) -> Result<bool, AmqpError> {
        self.channel()?;
        let pending = std::mem::take(&mut *self.pending.lock().await);

        let confirmations = async {
            let mut confirmations = Vec::with_capacity(pending.len());
            for confirm in pending {
                confirmations.push(confirm.await?);
            }
            Ok::<_, lapin::Error>(confirmations)
        };

        match tokio::time::timeout(timeout, confirmations).await {
            Err(_) => {
                debug!(?timeout, "timed out waiting for publisher confirms");
                Ok(false)
            }
            Ok(Err(err)) => {
                error!(error = err.to_string(), "error waiting for publisher confirms");
                Err(AmqpError::ConfirmError)
            }
            Ok(Ok(confirmations)) => Ok(all_confirmed(&confirmations)),
        }
    }

    async fn message_count(&self, queue: &str) -> Result<u32, AmqpError> {
        match self
            .channel()?
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), queue = queue, "error to inspect the queue");
                Err(AmqpError::MessageCountError(queue.to_owned()))
            }
            Ok(q) => Ok(q.message_count()),
        }
    }
}

/// True when the broker acked every publish and returned none of them.
fn all_confirmed(confirmations: &[Confirmation]) -> bool {
    let mut confirmed = true;

    for confirmation in confirmations {
        match confirmation {
            Confirmation::Ack(None) | Confirmation::NotRequested => {}
            Confirmation::Ack(Some(_)) => {
                warn!("broker returned an unroutable message");
                confirmed = false;
            }
            Confirmation::Nack(_) => {
                warn!("broker nacked a published message");
                confirmed = false;
            }
        }
    }

    confirmed
}

/// Builds the lapin properties for an outgoing message, filling a missing
/// message id and injecting `ctx` into the headers.
fn basic_properties(props: &MessageProperties, ctx: &Context) -> BasicProperties {
    let mut headers = props.headers.clone();
    otel::inject_context(ctx, &mut headers);

    let message_id = props
        .message_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut amqp = BasicProperties::default()
        .with_message_id(ShortString::from(message_id))
        .with_headers(FieldTable::from(amqp_headers(&headers)));

    if let Some(content_type) = &props.content_type {
        amqp = amqp.with_content_type(ShortString::from(content_type.clone()));
    }
    if let Some(kind) = &props.kind {
        amqp = amqp.with_type(ShortString::from(kind.clone()));
    }
    if let Some(correlation_id) = &props.correlation_id {
        amqp = amqp.with_correlation_id(ShortString::from(correlation_id.clone()));
    }
    if let Some(reply_to) = &props.reply_to {
        amqp = amqp.with_reply_to(ShortString::from(reply_to.clone()));
    }
    if let Some(mode) = props.delivery_mode {
        amqp = amqp.with_delivery_mode(mode);
    }

    amqp
}

fn amqp_headers(headers: &Headers) -> BTreeMap<ShortString, AMQPValue> {
    let mut btree = BTreeMap::new();

    for (key, value) in headers {
        let amqp_value = match value.clone() {
            HeaderValue::ShortString(v) => AMQPValue::ShortString(ShortString::from(v)),
            HeaderValue::LongString(v) => AMQPValue::LongString(LongString::from(v)),
            HeaderValue::Int(v) => AMQPValue::ShortInt(ShortInt::from(v)),
            HeaderValue::LongInt(v) => AMQPValue::LongInt(LongInt::from(v)),
            HeaderValue::LongLongInt(v) => AMQPValue::LongLongInt(LongLongInt::from(v)),
            HeaderValue::Uint(v) => AMQPValue::LongUInt(LongUInt::from(v)),
            HeaderValue::Bool(v) => AMQPValue::Boolean(v),
        };

        btree.insert(ShortString::from(key.clone()), amqp_value);
    }

    btree
}

fn header_value(value: &AMQPValue) -> Option<HeaderValue> {
    match value {
        AMQPValue::ShortString(v) => Some(HeaderValue::ShortString(v.to_string())),
        AMQPValue::LongString(v) => Some(HeaderValue::LongString(
            String::from_utf8_lossy(v.as_bytes()).into_owned(),
        )),
        AMQPValue::ShortInt(v) => Some(HeaderValue::Int(*v)),
        AMQPValue::LongInt(v) => Some(HeaderValue::LongInt(*v)),
        AMQPValue::LongLongInt(v) => Some(HeaderValue::LongLongInt(*v)),
        AMQPValue::LongUInt(v) => Some(HeaderValue::Uint(*v)),
        AMQPValue::Boolean(v) => Some(HeaderValue::Bool(*v)),
        _ => None,
    }
}

fn message_properties(props: &BasicProperties) -> MessageProperties {
    let mut headers = Headers::new();
    if let Some(table) = props.headers() {
        for (key, value) in table.inner() {
            match header_value(value) {
                Some(v) => {
                    headers.insert(key.to_string(), v);
                }
                None => debug!(header = key.as_str(), "skipping unsupported header type"),
            }
        }
    }

    MessageProperties {
        content_type: props.content_type().as_ref().map(|v| v.to_string()),
        message_id: props.message_id().as_ref().map(|v| v.to_string()),
        kind: props.kind().as_ref().map(|v| v.to_string()),
        correlation_id: props.correlation_id().as_ref().map(|v| v.to_string()),
        reply_to: props.reply_to().as_ref().map(|v| v.to_string()),
        delivery_mode: *props.delivery_mode(),
        headers,
    }
}

fn message_from_delivery(got: &BasicGetMessage) -> Message {
    let delivery = &got.delivery;

    Message {
        body: delivery.data.clone(),
        delivery_tag: delivery.delivery_tag,
        redelivered: delivery.redelivered,
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        message_count: got.message_count,
        properties: message_properties(&delivery.properties),
    }
}
