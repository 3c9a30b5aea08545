//! Wire-level message shapes shared by every context of an extension.
//!
//! The sending and receiving contexts may be different build artifacts, so the
//! JSON produced here is the compatibility surface:
//!
//! ```json
//! { "topic": "settings/get", "payload": {}, "options": { "targetProcessId": 5 } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt::{Display, Formatter};

/// Identifies a process (a browser tab) that content scripts run in
pub type ProcessId = i64;

/// Identifies a scope (a browser window) that contexts belong to
pub type ScopeId = i64;

/// Addressing hints attached to a single send.
///
/// At most one of `target_process_id` / `external_peer_id` is honored; when
/// both are set the process wins. `scope_id` applies to every destination
/// kind and is evaluated by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationOptions {
    /// Route to the content scripts of this process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_process_id: Option<ProcessId>,
    /// Route to another extension or an externally connectable page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_peer_id: Option<String>,
    /// Only receivers in this scope should handle the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeId>,
}

impl DestinationOptions {
    /// Options that route to the shared runtime with no scope restriction
    pub fn new() -> Self {
        Self::default()
    }

    /// Route to the content scripts of `process_id`
    pub fn to_process(mut self, process_id: ProcessId) -> Self {
        self.target_process_id = Some(process_id);
        self
    }

    /// Route to the external peer `peer_id`
    pub fn to_peer(mut self, peer_id: impl Into<String>) -> Self {
        self.external_peer_id = Some(peer_id.into());
        self
    }

    /// Restrict handling to receivers in `scope_id`
    pub fn in_scope(mut self, scope_id: ScopeId) -> Self {
        self.scope_id = Some(scope_id);
        self
    }

    /// Resolves where these options route to. First match wins: a process
    /// beats a peer, and an empty peer id counts as absent.
    pub fn destination(&self) -> Destination {
        if let Some(process_id) = self.target_process_id {
            return Destination::Process(process_id);
        }

        match self.external_peer_id.as_deref() {
            Some(peer_id) if !peer_id.is_empty() => Destination::ExternalPeer(peer_id.to_owned()),
            _ => Destination::Broadcast,
        }
    }

    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The resolved target of a send
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The content scripts running in one process
    Process(ProcessId),
    /// A different extension or an externally connectable page
    ExternalPeer(String),
    /// Every listening extension context sharing the runtime
    Broadcast,
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Process(process_id) => write!(f, "process {process_id}"),
            Destination::ExternalPeer(peer_id) => write!(f, "external peer \"{peer_id}\""),
            Destination::Broadcast => write!(f, "the extension runtime"),
        }
    }
}

/// A message in flight: the topic it belongs to, its payload, and how it was
/// addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The topic of the channel that sent this envelope
    pub topic: String,
    /// The serialized request
    #[serde(default)]
    pub payload: Value,
    /// Addressing hints, omitted from the wire when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<DestinationOptions>,
}

impl Envelope {
    /// Wraps `payload` for `topic`. Empty options are dropped.
    pub fn new(topic: impl Into<String>, payload: Value, options: Option<DestinationOptions>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            options: options.filter(|options| !options.is_empty()),
        }
    }

    /// Where this envelope is routed
    pub fn destination(&self) -> Destination {
        self.options
            .as_ref()
            .map(DestinationOptions::destination)
            .unwrap_or(Destination::Broadcast)
    }

    /// The scope the sender asked receivers to be in, if any
    pub fn scope_id(&self) -> Option<ScopeId> {
        self.options.as_ref().and_then(|options| options.scope_id)
    }

    /// Reads an envelope out of an arbitrary runtime message. Messages that
    /// are not envelopes (other code may share the runtime) yield `None`.
    pub fn from_message(message: Value) -> Option<Self> {
        match &message {
            Value::Object(map) if matches!(map.get("topic"), Some(Value::String(_))) => {
                serde_json::from_value(message).ok()
            }
            _ => None,
        }
    }

    /// Serializes into the wire shape
    pub fn into_message(self) -> Value {
        let mut map = Map::new();
        map.insert("topic".into(), Value::String(self.topic));
        map.insert("payload".into(), self.payload);
        if let Some(options) = self.options {
            // DestinationOptions holds only integers and strings
            map.insert(
                "options".into(),
                serde_json::to_value(options).unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }
}

/// Context about whoever sent a received envelope, as reported by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderMetadata {
    /// The process the sender runs in, when it is a content script
    pub process_id: Option<ProcessId>,
    /// The frame within that process
    pub frame_id: Option<i64>,
    /// The extension (or peer) id of the sender
    pub extension_id: Option<String>,
    /// The URL of the sending document
    pub url: Option<String>,
    /// The origin of the sending document
    pub origin: Option<String>,
}

/// How a raw reply from the host is interpreted.
///
/// Any object carrying a string `error` field is taken to be an application
/// failure, even when a handler meant to return it as data. Handlers must not
/// return payloads of that shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A successful reply; `None` when the reply was absent or `null`
    Value(Option<Value>),
    /// The receiving handler failed with this message
    Failure(String),
}

impl Reply {
    /// Classifies a raw reply
    pub fn interpret(reply: Option<Value>) -> Self {
        match reply {
            None | Some(Value::Null) => Reply::Value(None),
            Some(Value::Object(map)) => match map.get("error") {
                Some(Value::String(message)) => Reply::Failure(message.clone()),
                _ => Reply::Value(Some(Value::Object(map))),
            },
            Some(value) => Reply::Value(Some(value)),
        }
    }

    /// Builds the error envelope sent back when a handler fails
    pub fn failure(message: impl Into<String>) -> Value {
        json!({ "error": message.into() })
    }
}
