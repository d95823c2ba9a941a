//! Message Protocol
//!
//! Defines the envelopes exchanged between clients and the relay.
//!
//! Client → server: a JSON object carrying a string `command` field plus any
//! command-specific fields. Server → client: `{"message": "<string>"}`, used
//! both for relayed broadcasts and for error reports.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolViolation;

/// Name of the envelope field that selects the handler.
pub const COMMAND_FIELD: &str = "command";

/// A decoded client request
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Handler name, matched exactly and case-sensitively
    pub name: String,
    /// The envelope object without its `command` field
    pub payload: Map<String, Value>,
}

impl Command {
    /// Decode a raw text frame into a command.
    ///
    /// Anything other than a JSON object with a string `command` field is a
    /// protocol violation; a missing and a non-string `command` are treated
    /// the same.
    pub fn decode(text: &str) -> Result<Self, ProtocolViolation> {
        let value: Value =
            serde_json::from_str(text).map_err(|_| ProtocolViolation::InvalidJson)?;

        let Value::Object(mut payload) = value else {
            return Err(ProtocolViolation::NotAnObject);
        };

        match payload.remove(COMMAND_FIELD) {
            Some(Value::String(name)) => Ok(Self { name, payload }),
            _ => Err(ProtocolViolation::MissingCommand),
        }
    }

    /// Decode the payload into a handler-specific type.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }
}

/// Server → client envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: String,
}

impl MessageEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Serialize the envelope to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
