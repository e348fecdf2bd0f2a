// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Wrapper
//!
//! This module provides the error taxonomy for every operation exposed by the
//! connection guard and its broker collaborators. The first four variants are
//! raised by the guard itself; the rest describe failures reported by the
//! underlying client while it performs I/O.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// No connection factory was configured when a connect was attempted
    #[error("no connection factory configured")]
    NoConnectionFactory,

    /// The connection factory did not produce a connection
    #[error("the connection factory produced no connection")]
    NoConnection,

    /// The connection did not produce a channel
    #[error("the connection produced no channel")]
    NoChannel,

    /// A broker operation was attempted while not connected
    #[error("operation is not valid while disconnected")]
    InvalidOperation,

    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error closing the channel
    #[error("failure to close the channel `{0}`")]
    CloseChannelError(String),

    /// Error closing the connection
    #[error("failure to close the connection `{0}`")]
    CloseConnectionError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error fetching a message from the given queue
    #[error("failure to get a message from `{0}`")]
    GetMessageError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error while waiting for publisher confirms
    #[error("failure to wait for publisher confirms")]
    ConfirmError,

    /// Error querying the depth of the given queue
    #[error("failure to count messages in `{0}`")]
    MessageCountError(String),

    /// Error parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error serializing a message payload
    #[error("failure to serialize payload")]
    SerializePayloadError,

    /// Invalid or unreadable configuration
    #[error("invalid configuration `{0}`")]
    ConfigError(String),
}
