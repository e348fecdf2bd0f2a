// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! A connection guard over a RabbitMQ client.
//!
//! [`ConnectionGuard`] owns at most one broker connection and one channel,
//! validates state before every operation and delegates the work to a
//! [`client`] implementation, lapin by default.

mod otel;

pub mod channel;
pub mod client;
pub mod errors;
pub mod guard;
pub mod message;
pub mod settings;

pub use errors::AmqpError;
pub use guard::ConnectionGuard;
pub use message::{HeaderValue, Message, MessageProperties};
pub use settings::Settings;
