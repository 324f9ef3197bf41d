//! Wire protocol shared by client and server.
//!
//! Every message is a single JSON document terminated by a newline on the
//! transport. Messages are tagged by a `type` field:
//!
//! - client → server: `{"type":"subscribe","stocks":["AAPL", ...]}`
//! - server → client: `{"type":"update","data":{"AAPL":100.5, ...}}`
//! - server → client on malformed input: `{"error":"..."}`
//!
//! Decoding goes through [`decode_client`] / [`decode_server`] only. A message
//! with a well-formed but unknown `type` is surfaced as
//! [`Inbound::Unrecognized`] so the caller can log and ignore it; everything
//! else that does not match a known schema is a [`StreamError::Protocol`] or
//! [`StreamError::Json`].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;
use crate::result::Result;

/// Opaque symbol identifier, e.g. `AAPL`.
pub type Symbol = String;

/// Symbol → price mapping. Used both for full snapshots and partial updates.
pub type PriceMap = BTreeMap<Symbol, f64>;

/// Tag of the subscription request.
pub const SUBSCRIBE: &str = "subscribe";
/// Tag of the price update.
pub const UPDATE: &str = "update";

/// Message sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Replace the connection's subscription with `stocks`.
    Subscribe {
        /// Full set of symbols the client wants from now on.
        stocks: Vec<Symbol>,
    },
}

/// Tagged message sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Prices of the subscribed symbols for one tick.
    Update {
        /// Intersection of the tick snapshot with the subscription.
        data: PriceMap,
    },
}

/// Untagged acknowledgment sent back for malformed client input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Human readable reason.
    pub error: String,
}

impl ErrorReply {
    /// Creates a reply carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Result of decoding one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<T> {
    /// Recognized and schema-valid message.
    Message(T),
    /// Error reported by the peer (`{"error": "..."}`); only produced by [`decode_server`].
    Error(String),
    /// Well-formed message with a `type` nobody here understands.
    Unrecognized(String),
}

/// Serialize any protocol message to its single-line JSON form (no trailing newline).
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a line received by the server.
pub fn decode_client(line: &str) -> Result<Inbound<ClientMessage>> {
    let value: Value = serde_json::from_str(line)?;
    let tag = message_tag(&value)?;
    match tag.as_deref() {
        Some(SUBSCRIBE) => Ok(Inbound::Message(serde_json::from_value(value)?)),
        Some(other) => Ok(Inbound::Unrecognized(other.to_string())),
        None => Err(StreamError::Protocol("missing message type".to_string())),
    }
}

/// Decode a line received by the client.
pub fn decode_server(line: &str) -> Result<Inbound<ServerMessage>> {
    let value: Value = serde_json::from_str(line)?;
    let tag = message_tag(&value)?;
    match tag.as_deref() {
        Some(UPDATE) => Ok(Inbound::Message(serde_json::from_value(value)?)),
        Some(other) => Ok(Inbound::Unrecognized(other.to_string())),
        None => {
            let reply: ErrorReply = serde_json::from_value(value).map_err(|_| {
                StreamError::Protocol("message has neither `type` nor `error`".to_string())
            })?;
            Ok(Inbound::Error(reply.error))
        }
    }
}

fn message_tag(value: &Value) -> Result<Option<String>> {
    let object = value
        .as_object()
        .ok_or_else(|| StreamError::Protocol("expected a JSON object".to_string()))?;
    match object.get("type") {
        None => Ok(None),
        Some(Value::String(tag)) => Ok(Some(tag.clone())),
        Some(_) => Err(StreamError::Protocol("`type` must be a string".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_wire_format() {
        let msg = ClientMessage::Subscribe {
            stocks: vec!["AAPL".to_string(), "MSFT".to_string()],
        };
        assert_eq!(
            encode(&msg).unwrap(),
            r#"{"type":"subscribe","stocks":["AAPL","MSFT"]}"#
        );
    }

    #[test]
    fn update_wire_format() {
        let data: PriceMap = [("AAPL".to_string(), 100.5)].into_iter().collect();
        let line = encode(&ServerMessage::Update { data }).unwrap();
        assert_eq!(line, r#"{"type":"update","data":{"AAPL":100.5}}"#);
    }

    #[test]
    fn error_reply_is_untagged() {
        let line = encode(&ErrorReply::new("Failed to parse message")).unwrap();
        assert_eq!(line, r#"{"error":"Failed to parse message"}"#);
    }

    #[test]
    fn decodes_subscribe() {
        let decoded = decode_client(r#"{"type":"subscribe","stocks":["AAPL"]}"#).unwrap();
        assert_eq!(
            decoded,
            Inbound::Message(ClientMessage::Subscribe {
                stocks: vec!["AAPL".to_string()]
            })
        );
    }

    #[test]
    fn unknown_type_is_unrecognized_not_error() {
        let decoded = decode_client(r#"{"type":"unsubscribe","stocks":["AAPL"]}"#).unwrap();
        assert_eq!(decoded, Inbound::Unrecognized("unsubscribe".to_string()));
    }

    #[test]
    fn rejects_malformed_client_input() {
        assert!(matches!(decode_client("not json"), Err(StreamError::Json(_))));
        assert!(matches!(decode_client("[1,2]"), Err(StreamError::Protocol(_))));
        assert!(matches!(
            decode_client(r#"{"stocks":["AAPL"]}"#),
            Err(StreamError::Protocol(_))
        ));
        assert!(matches!(
            decode_client(r#"{"type":7}"#),
            Err(StreamError::Protocol(_))
        ));
        assert!(decode_client(r#"{"type":"subscribe"}"#).is_err());
        assert!(decode_client(r#"{"type":"subscribe","stocks":"AAPL"}"#).is_err());
    }

    #[test]
    fn decodes_server_messages() {
        let update = decode_server(r#"{"type":"update","data":{"AAPL":100.5,"MSFT":200}}"#)
            .unwrap();
        let data = match update {
            Inbound::Message(ServerMessage::Update { data }) => data,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(data.get("AAPL"), Some(&100.5));
        assert_eq!(data.get("MSFT"), Some(&200.0));

        assert_eq!(
            decode_server(r#"{"error":"Failed to parse message"}"#).unwrap(),
            Inbound::Error("Failed to parse message".to_string())
        );
        assert_eq!(
            decode_server(r#"{"type":"heartbeat"}"#).unwrap(),
            Inbound::Unrecognized("heartbeat".to_string())
        );
        assert!(decode_server(r#"{"data":{}}"#).is_err());
    }
}
