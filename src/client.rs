// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Client Capabilities
//!
//! The connection guard never performs I/O itself. It talks to the broker
//! through the three capabilities declared here: a factory producing
//! connections, a connection producing channels, and a channel carrying the
//! message operations. The [`channel`](crate::channel) module implements them
//! on top of lapin.

use crate::{
    errors::AmqpError,
    message::{Message, MessageProperties},
    settings::Settings,
};
use async_trait::async_trait;
use std::time::Duration;

/// Produces broker connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens a connection described by `settings`, or `None` if no connection
    /// could be established.
    async fn create_connection(&self, settings: &Settings) -> Option<Box<dyn BrokerConnection>>;
}

/// A live transport session to the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn is_open(&self) -> bool;

    /// Opens a channel on this connection, or `None` if the channel could not be created.
    async fn create_channel(&self) -> Option<Box<dyn BrokerChannel>>;

    async fn close(&self) -> Result<(), AmqpError>;

    /// Releases the underlying handle. Must be called after `close`.
    fn dispose(&mut self);
}

/// A logical session multiplexed over a connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<(), AmqpError>;

    /// Releases the underlying handle. Must be called after `close`.
    fn dispose(&mut self);

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        properties: &MessageProperties,
        payload: &[u8],
    ) -> Result<(), AmqpError>;

    /// Fetches a single message, `None` when the queue is empty.
    async fn get(&self, queue: &str, auto_ack: bool) -> Result<Option<Message>, AmqpError>;

    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), AmqpError>;

    async fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool)
        -> Result<(), AmqpError>;

    /// Waits until every outstanding publish is confirmed, or `timeout` elapses.
    /// Returns `false` when the broker rejected a publish or the wait timed out.
    async fn wait_for_confirms(&self, timeout: Duration) -> Result<bool, AmqpError>;

    async fn message_count(&self, queue: &str) -> Result<u32, AmqpError>;
}
