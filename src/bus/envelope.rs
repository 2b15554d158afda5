//! Wire envelopes for the message bus.
//!
//! Everything on the wire is one of three envelopes: a correlated request,
//! its response, or an uncorrelated event. Method and topic names are
//! dot-namespaced strings (e.g. `session.send`, `tool.approval`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured error carried in a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable description
    pub message: String,
    /// Machine-readable code (e.g. "method_not_found", "timeout")
    pub code: String,
    /// Optional structured detail from the handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorPayload {
    /// Create an error payload with a code and message.
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.to_string(),
            detail: None,
        }
    }

    /// Attach structured detail.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// One unit on the bus wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// A correlated request
    Request {
        /// Correlation id, unique per sending side
        id: u64,
        /// When the envelope was created
        timestamp: DateTime<Utc>,
        /// Dot-namespaced method name
        method: String,
        /// Request parameters
        params: Value,
    },
    /// The response to a request with the same id
    Response {
        /// Correlation id matching the request
        id: u64,
        /// When the envelope was created
        timestamp: DateTime<Utc>,
        /// Result payload on success
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error payload on failure
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorPayload>,
    },
    /// An uncorrelated publish/subscribe event
    Event {
        /// Envelope id (not correlated with anything)
        id: u64,
        /// When the envelope was created
        timestamp: DateTime<Utc>,
        /// Dot-namespaced topic name
        topic: String,
        /// Event payload
        data: Value,
    },
}

impl Envelope {
    /// Create a request envelope.
    pub fn request(id: u64, method: &str, params: Value) -> Self {
        Envelope::Request {
            id,
            timestamp: Utc::now(),
            method: method.to_string(),
            params,
        }
    }

    /// Create a success response.
    pub fn response_ok(id: u64, result: Value) -> Self {
        Envelope::Response {
            id,
            timestamp: Utc::now(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn response_err(id: u64, error: ErrorPayload) -> Self {
        Envelope::Response {
            id,
            timestamp: Utc::now(),
            result: None,
            error: Some(error),
        }
    }

    /// Create an event envelope.
    pub fn event(id: u64, topic: &str, data: Value) -> Self {
        Envelope::Event {
            id,
            timestamp: Utc::now(),
            topic: topic.to_string(),
            data,
        }
    }

    /// The envelope id.
    pub fn id(&self) -> u64 {
        match self {
            Envelope::Request { id, .. }
            | Envelope::Response { id, .. }
            | Envelope::Event { id, .. } => *id,
        }
    }
}
