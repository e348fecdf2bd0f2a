// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Settings
//!
//! The configuration bundle consumed by the connection guard and by the lapin
//! connection factory: where the broker lives, how to authenticate, and which
//! exchange and queue the guard publishes to and reads from.
//!
//! Settings can be built in code, parsed from TOML, and overridden from the
//! process environment.

use crate::errors::AmqpError;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

pub const ENV_HOST: &str = "RABBITMQ_HOST";
pub const ENV_PORT: &str = "RABBITMQ_PORT";
pub const ENV_USER: &str = "RABBITMQ_USER";
pub const ENV_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const ENV_VHOST: &str = "RABBITMQ_VHOST";
pub const ENV_EXCHANGE: &str = "RABBITMQ_EXCHANGE";
pub const ENV_QUEUE: &str = "RABBITMQ_QUEUE";

/// Broker connection and routing configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub virtual_host: String,
    pub exchange: String,
    pub queue: String,
    /// Name reported to the broker for the connection
    pub connection_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hostname: "localhost".to_owned(),
            port: 5672,
            username: "guest".to_owned(),
            password: "guest".to_owned(),
            virtual_host: "/".to_owned(),
            exchange: String::new(),
            queue: String::new(),
            connection_name: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("virtual_host", &self.virtual_host)
            .field("exchange", &self.exchange)
            .field("queue", &self.queue)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

impl Settings {
    /// Parses settings from a TOML document. Keys that are not present keep
    /// their default values.
    pub fn from_toml(raw: &str) -> Result<Settings, AmqpError> {
        toml::from_str(raw).map_err(|err| {
            error!(error = err.to_string(), "failure to parse settings");
            AmqpError::ConfigError(err.message().to_owned())
        })
    }

    /// Applies the `RABBITMQ_*` environment variables on top of these settings.
    pub fn with_env_overrides(self) -> Result<Settings, AmqpError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides<F>(mut self, lookup: F) -> Result<Settings, AmqpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.hostname = host;
        }

        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.parse().map_err(|_| {
                error!(value = port, "invalid broker port");
                AmqpError::ConfigError(format!("{ENV_PORT}={port}"))
            })?;
        }

        if let Some(user) = lookup(ENV_USER) {
            self.username = user;
        }

        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = password;
        }

        if let Some(vhost) = lookup(ENV_VHOST) {
            self.virtual_host = vhost;
        }

        if let Some(exchange) = lookup(ENV_EXCHANGE) {
            self.exchange = exchange;
        }

        if let Some(queue) = lookup(ENV_QUEUE) {
            self.queue = queue;
        }

        Ok(self)
    }

    /// Builds the AMQP URI used to open a connection.
    ///
    /// Credentials and vhost are carried as structured fields, so they may
    /// contain characters that are reserved in a URI string.
    pub fn amqp_uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.hostname.clone(),
                port: self.port,
            },
            vhost: self.virtual_host.clone(),
            ..AMQPUri::default()
        }
    }
}
