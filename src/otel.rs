// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! This module provides utilities for propagating trace context through
//! message headers: injecting the current context when publishing, and
//! extracting it again from fetched messages.

use crate::message::{HeaderValue, Headers};
use opentelemetry::{
    propagation::{Extractor, Injector},
    Context,
};

/// An adapter for injecting and extracting OpenTelemetry context from message headers.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a mut Headers,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut Headers) -> Self {
        Self { headers }
    }
}

impl Injector for RabbitMQTracePropagator<'_> {
    /// Sets a trace context key-value pair in the message headers.
    fn set(&mut self, key: &str, value: String) {
        self.headers
            .insert(key.to_lowercase(), HeaderValue::LongString(value));
    }
}

impl Extractor for RabbitMQTracePropagator<'_> {
    /// Gets a trace context value from the message headers.
    ///
    /// Only string headers can carry trace context; other values are ignored.
    fn get(&self, key: &str) -> Option<&str> {
        match self.headers.get(key) {
            Some(HeaderValue::LongString(value)) | Some(HeaderValue::ShortString(value)) => {
                Some(value.as_str())
            }
            _ => None,
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Injects `ctx` into `headers` using the globally configured propagator.
pub(crate) fn inject_context(ctx: &Context, headers: &mut Headers) {
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut RabbitMQTracePropagator::new(headers))
    });
}

/// Extracts a context from `headers` using the globally configured propagator.
pub(crate) fn extract_context(headers: &Headers) -> Context {
    let mut headers = headers.clone();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&RabbitMQTracePropagator::new(&mut headers))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injector_lowercases_keys() {
        let mut headers = Headers::new();

        RabbitMQTracePropagator::new(&mut headers).set("TraceParent", "00-abc".to_owned());

        assert_eq!(
            headers.get("traceparent"),
            Some(&HeaderValue::LongString("00-abc".to_owned()))
        );
    }

    #[test]
    fn extractor_reads_string_headers_only() {
        let mut headers = Headers::new();
        headers.insert("traceparent".to_owned(), HeaderValue::ShortString("00-abc".to_owned()));
        headers.insert("retries".to_owned(), HeaderValue::LongInt(3));

        let propagator = RabbitMQTracePropagator::new(&mut headers);

        assert_eq!(propagator.get("traceparent"), Some("00-abc"));
        assert_eq!(propagator.get("retries"), None);
        assert_eq!(propagator.get("missing"), None);
        assert_eq!(propagator.keys(), vec!["retries", "traceparent"]);
    }
}
