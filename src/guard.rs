// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Guard
//!
//! The guard owns at most one broker connection and at most one channel on
//! it. It validates state before every broker operation and delegates the
//! actual work to the [`client`](crate::client) capabilities; it never
//! performs I/O itself.
//!
//! Every operation returns a `Result`: failures are reported to the caller,
//! never raised. Operations that touch the broker require the guard to be
//! [`connected`](ConnectionGuard::connected) and fail with
//! [`AmqpError::InvalidOperation`] without calling the client otherwise.

use crate::{
    channel::LapinConnectionFactory,
    client::{BrokerChannel, BrokerConnection, ConnectionFactory},
    errors::AmqpError,
    message::Message,
    settings::Settings,
};
use std::time::Duration;
use tracing::{debug, error, warn};

/// The broker session held by the guard.
///
/// A channel is only ever stored together with the connection it was opened on.
enum Session {
    Idle,
    Open {
        connection: Box<dyn BrokerConnection>,
        channel: Box<dyn BrokerChannel>,
    },
    /// A connection whose channel could not be created. It is kept until the
    /// next teardown.
    Orphaned {
        connection: Box<dyn BrokerConnection>,
    },
}

/// Guards a single broker connection and its channel.
///
/// Callers must serialize access to one guard; lifecycle operations take
/// `&mut self`.
pub struct ConnectionGuard {
    settings: Settings,
    factory: Option<Box<dyn ConnectionFactory>>,
    session: Session,
}

impl ConnectionGuard {
    /// Creates a guard that connects through lapin.
    pub fn new(settings: Settings) -> ConnectionGuard {
        let factory: Box<dyn ConnectionFactory> = Box::new(LapinConnectionFactory::new());
        ConnectionGuard::with_factory(settings, Some(factory))
    }

    /// Creates a guard with a custom connection factory. Without a factory
    /// every connect fails with [`AmqpError::NoConnectionFactory`].
    pub fn with_factory(
        settings: Settings,
        factory: Option<Box<dyn ConnectionFactory>>,
    ) -> ConnectionGuard {
        ConnectionGuard {
            settings,
            factory,
            session: Session::Idle,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replaces the settings, closing any open channel and connection first.
    ///
    /// A failed teardown is logged and does not prevent the replacement.
    pub async fn set_settings(&mut self, settings: Settings) {
        if let Err(err) = self.teardown().await {
            warn!(error = err.to_string(), "failure to close session while replacing settings");
        }

        self.settings = settings;
        debug!("settings replaced");
    }

    /// Returns true when a factory is configured and both the connection and
    /// its channel report open. The channel is not queried when the
    /// connection is closed.
    pub fn connected(&self) -> bool {
        self.open_channel().is_some()
    }

    pub fn init(&self) {
        debug!(settings = ?self.settings, "connection guard initialized");
    }

    pub fn deinit(&self) {
        debug!(connected = self.connected(), "connection guard deinitialized");
    }

    /// Opens a connection and a channel on it.
    ///
    /// A session that is still held is torn down first. When the channel
    /// cannot be created the new connection is retained, unclosed, until the
    /// next disconnect.
    pub async fn connect(&mut self) -> Result<(), AmqpError> {
        self.teardown().await?;

        let Some(factory) = self.factory.as_ref() else {
            error!("no connection factory configured");
            return Err(AmqpError::NoConnectionFactory);
        };

        let Some(connection) = factory.create_connection(&self.settings).await else {
            error!(host = %self.settings.hostname, "no connection was created");
            return Err(AmqpError::NoConnection);
        };

        let Some(channel) = connection.create_channel().await else {
            warn!("no channel was created, retaining the connection without a channel");
            self.session = Session::Orphaned { connection };
            return Err(AmqpError::NoChannel);
        };

        self.session = Session::Open {
            connection,
            channel,
        };
        debug!("connected");

        Ok(())
    }

    /// Closes and disposes the channel, then the connection.
    ///
    /// Does nothing when no session is held. The first close failure is
    /// returned and the remaining resources are left as they are.
    pub async fn disconnect(&mut self) -> Result<(), AmqpError> {
        self.teardown().await?;
        debug!("disconnected");
        Ok(())
    }

    /// Publishes `msg` to the configured exchange with the message's routing key.
    pub async fn write_msg(&self, msg: &Message) -> Result<(), AmqpError> {
        let channel = self.require_channel("write")?;

        channel
            .publish(
                &self.settings.exchange,
                &msg.routing_key,
                false,
                &msg.properties,
                &msg.body,
            )
            .await
    }

    /// Fetches one message from the configured queue. Returns `Ok(None)` when
    /// the queue is empty.
    pub async fn read_msg(&self, auto_ack: bool) -> Result<Option<Message>, AmqpError> {
        let channel = self.require_channel("read")?;

        let msg = channel.get(&self.settings.queue, auto_ack).await?;
        if msg.is_none() {
            debug!(queue = %self.settings.queue, "no message available");
        }

        Ok(msg)
    }

    pub async fn ack_msg(&self, msg: &Message) -> Result<(), AmqpError> {
        let channel = self.require_channel("ack")?;
        channel.ack(msg.delivery_tag, false).await
    }

    pub async fn nack_msg(&self, msg: &Message, requeue: bool) -> Result<(), AmqpError> {
        let channel = self.require_channel("nack")?;
        channel.nack(msg.delivery_tag, false, requeue).await
    }

    /// Waits for the broker to confirm every outstanding publish, bounded by
    /// `timeout`. Returns the broker's outcome.
    pub async fn wait_for_write_confirm(&self, timeout: Duration) -> Result<bool, AmqpError> {
        let channel = self.require_channel("wait for confirm")?;
        channel.wait_for_confirms(timeout).await
    }

    /// Returns the number of messages ready in the configured queue.
    pub async fn queued_msgs(&self) -> Result<u32, AmqpError> {
        let channel = self.require_channel("queue depth")?;
        channel.message_count(&self.settings.queue).await
    }

    fn open_channel(&self) -> Option<&dyn BrokerChannel> {
        if self.factory.is_none() {
            return None;
        }

        match &self.session {
            Session::Open {
                connection,
                channel,
            } if connection.is_open() && channel.is_open() => Some(channel.as_ref()),
            Session::Orphaned { connection } => {
                // no channel to hand out, whatever the connection reports
                connection.is_open();
                None
            }
            _ => None,
        }
    }

    fn require_channel(&self, operation: &str) -> Result<&dyn BrokerChannel, AmqpError> {
        self.open_channel().ok_or_else(|| {
            error!(operation, "broker operation attempted while disconnected");
            AmqpError::InvalidOperation
        })
    }

    async fn teardown(&mut self) -> Result<(), AmqpError> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => Ok(()),
            Session::Open {
                connection,
                mut channel,
            } => {
                if channel.is_open() {
                    if let Err(err) = channel.close().await {
                        error!(error = err.to_string(), "failure to close the channel");
                        self.session = Session::Open {
                            connection,
                            channel,
                        };
                        return Err(err);
                    }
                    channel.dispose();
                }

                self.close_connection(connection).await
            }
            Session::Orphaned { connection } => self.close_connection(connection).await,
        }
    }

    async fn close_connection(
        &mut self,
        mut connection: Box<dyn BrokerConnection>,
    ) -> Result<(), AmqpError> {
        if connection.is_open() {
            if let Err(err) = connection.close().await {
                error!(error = err.to_string(), "failure to close the connection");
                self.session = Session::Orphaned { connection };
                return Err(err);
            }
            connection.dispose();
        }

        Ok(())
    }
}
