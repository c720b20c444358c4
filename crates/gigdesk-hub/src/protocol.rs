//! JSON hub protocol framing.
//!
//! ```text
//! {"protocol":"json","version":1}<RS>                       client handshake
//! {}<RS>  |  {"error":"..."}<RS>                             server handshake reply
//! {"type":1,"target":"JoinChat","arguments":["<id>"]}<RS>   invocation
//! {"type":6}<RS>                                             ping
//! {"type":7,"error":"...","allowReconnect":true}<RS>         close
//! ```
//!
//! `<RS>` is the ASCII record separator 0x1E. A single WebSocket text message
//! may carry several frames.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use gigdesk_types::events::{HubCommand, HubEvent};
use gigdesk_types::models::{Chat, Message};

use crate::error::HubError;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation(HubEvent),
    Completion {
        invocation_id: String,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items, unknown targets and future message types.
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

#[derive(Debug, Deserialize)]
struct HandshakeReply {
    #[serde(default)]
    error: Option<String>,
}

pub fn handshake_request() -> String {
    frame(json!({ "protocol": "json", "version": 1 }))
}

/// Accept `{}` and reject `{"error": ...}`.
pub fn parse_handshake(raw: &str) -> Result<(), HubError> {
    let reply: HandshakeReply = serde_json::from_str(raw)?;
    match reply.error {
        Some(error) => Err(HubError::Handshake(error)),
        None => Ok(()),
    }
}

/// Split a text payload into its frames, dropping empty tails.
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|f| !f.trim().is_empty())
}

pub fn encode_command(cmd: &HubCommand) -> String {
    frame(json!({
        "type": TYPE_INVOCATION,
        "target": cmd.target(),
        "arguments": cmd.arguments(),
    }))
}

pub fn encode_ping() -> String {
    frame(json!({ "type": TYPE_PING }))
}

fn frame(value: Value) -> String {
    let mut out = value.to_string();
    out.push(RECORD_SEPARATOR);
    out
}

pub fn decode(raw: &str) -> Result<HubMessage, HubError> {
    let frame: RawFrame = serde_json::from_str(raw)?;
    match frame.kind {
        TYPE_INVOCATION => {
            let target = frame
                .target
                .ok_or_else(|| HubError::Protocol("invocation without target".into()))?;
            decode_invocation(&target, frame.arguments)
        }
        TYPE_COMPLETION => Ok(HubMessage::Completion {
            invocation_id: frame.invocation_id.unwrap_or_default(),
            error: frame.error,
        }),
        TYPE_PING => Ok(HubMessage::Ping),
        TYPE_CLOSE => Ok(HubMessage::Close {
            error: frame.error,
            allow_reconnect: frame.allow_reconnect,
        }),
        other => {
            debug!("ignoring hub frame of type {}", other);
            Ok(HubMessage::Ignored)
        }
    }
}

fn decode_invocation(target: &str, arguments: Vec<Value>) -> Result<HubMessage, HubError> {
    let event = match target {
        "ReceiveMessage" => HubEvent::ReceiveMessage(first_argument::<Message>(target, arguments)?),
        "MessageUpdated" => HubEvent::MessageUpdated(first_argument::<Message>(target, arguments)?),
        "MessageDeleted" => HubEvent::MessageDeleted(first_argument::<Uuid>(target, arguments)?),
        "UserTyping" => HubEvent::UserTyping(first_argument::<Uuid>(target, arguments)?),
        "UpdateChats" => HubEvent::UpdateChats(first_argument::<Vec<Chat>>(target, arguments)?),
        _ => {
            debug!("ignoring invocation of unknown target {}", target);
            return Ok(HubMessage::Ignored);
        }
    };
    Ok(HubMessage::Invocation(event))
}

fn first_argument<T: serde::de::DeserializeOwned>(target: &str, arguments: Vec<Value>) -> Result<T, HubError> {
    let value = arguments
        .into_iter()
        .next()
        .ok_or_else(|| HubError::Protocol(format!("{} without arguments", target)))?;
    serde_json::from_value(value).map_err(|e| HubError::Protocol(format!("{}: {}", target, e)))
}
