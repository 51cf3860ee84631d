//! The in-flight message: server-only [`Control`] metadata joined to a
//! user-visible [`Payload`].
//!
//! Control fields are addressed by their wire names (`_sender`, `_event`,
//! `_remember`, `_serial`, `_time`, `_set`, `to`) when a pipeline stage
//! matches on them. Only `to`, `_serial`, `_time` and `_set` ever leave the
//! server; see [`Message::to_wire`].

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ConnectionId;
use crate::payload::Payload;

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    /// Synthesized by the channel itself.
    Server,
    /// Arrived from a client connection.
    Connection(ConnectionId),
}

impl Sender {
    /// The connection, if this sender is one.
    pub fn connection(self) -> Option<ConnectionId> {
        match self {
            Self::Server => None,
            Self::Connection(id) => Some(id),
        }
    }
}

/// Lifecycle event tagged onto relay-originated messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A transport connection opened.
    Connect,
    /// A transport connection closed.
    Disconnect,
    /// A client sent a frame.
    Transmit,
}

impl EventKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Transmit => "transmit",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-directed state instruction, encoded under `_set`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSet {
    /// The client's finalized display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `[old, new]` after a rename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<[String; 2]>,
    /// Current display names in the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    /// `[serial]` of the newest history record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<[u64; 1]>,
}

impl ClientSet {
    /// Tell the client its name.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Tell the client it was renamed.
    pub fn renamed(old: impl Into<String>, new: impl Into<String>) -> Self {
        let new = new.into();
        Self {
            name: Some(new.clone()),
            rename: Some([old.into(), new]),
            ..Self::default()
        }
    }

    /// Current user list.
    pub fn users(users: Vec<String>) -> Self {
        Self {
            users: Some(users),
            ..Self::default()
        }
    }

    /// Latest history serial.
    pub fn last_seen(serial: u64) -> Self {
        Self {
            last_seen: Some([serial]),
            ..Self::default()
        }
    }
}

/// Server-only metadata. Never deserialized from client input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Control {
    /// Originating connection, or the server.
    pub sender: Option<Sender>,
    /// Transport event that produced the message.
    pub event: Option<EventKind>,
    /// Persist to history before broadcast.
    pub remember: bool,
    /// History serial, once persisted.
    pub serial: Option<u64>,
    /// Unix milliseconds, coarse and strictly increasing per channel.
    pub timestamp: Option<i64>,
    /// Client instruction.
    pub set: Option<ClientSet>,
    /// Addressing list; `None` means every approved listener.
    pub to: Option<Vec<ConnectionId>>,
}

/// A message as it moves through the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Server-only metadata.
    pub control: Control,
    /// User-visible fields.
    pub payload: Payload,
}

impl Message {
    /// Message with no control metadata yet.
    pub fn new(payload: Payload) -> Self {
        Self {
            control: Control::default(),
            payload,
        }
    }

    /// Relay-originated message from a live connection.
    pub fn from_connection(id: ConnectionId, event: EventKind, payload: Payload) -> Self {
        Self {
            control: Control {
                sender: Some(Sender::Connection(id)),
                event: Some(event),
                ..Control::default()
            },
            payload,
        }
    }

    /// Address the message to a single connection.
    #[must_use]
    pub fn to_connection(mut self, id: ConnectionId) -> Self {
        self.control.to = Some(vec![id]);
        self
    }

    /// Mark the message for persistence.
    #[must_use]
    pub fn remembered(mut self) -> Self {
        self.control.remember = true;
        self
    }

    /// Attach a client instruction.
    #[must_use]
    pub fn with_set(mut self, set: ClientSet) -> Self {
        self.control.set = Some(set);
        self
    }

    /// Connection that sent this message, if any.
    pub fn sender_connection(&self) -> Option<ConnectionId> {
        self.control.sender.and_then(Sender::connection)
    }

    /// Look up a field by wire name, control fields first.
    ///
    /// Control fields that are unset (or a `false` remember flag) read as
    /// absent.
    pub fn field(&self, key: &str) -> Option<Cow<'_, Value>> {
        let c = &self.control;
        match key {
            "_sender" => c.sender.map(|s| {
                Cow::Owned(match s {
                    Sender::Server => Value::from("server"),
                    Sender::Connection(id) => Value::from(id.as_u64()),
                })
            }),
            "_event" => c.event.map(|e| Cow::Owned(Value::from(e.as_str()))),
            "_remember" => c.remember.then(|| Cow::Owned(Value::Bool(true))),
            "_serial" => c.serial.map(|s| Cow::Owned(Value::from(s))),
            "_time" => c.timestamp.map(|t| Cow::Owned(Value::from(t))),
            "_set" => c
                .set
                .as_ref()
                .and_then(|s| serde_json::to_value(s).ok())
                .map(Cow::Owned),
            "to" => c.to.as_ref().map(|ids| Cow::Owned(ids_value(ids))),
            _ => self.payload.get(key).map(Cow::Borrowed),
        }
    }

    /// JSON object sent to clients.
    ///
    /// Payload keys first, then the addressing list and the public control
    /// fields. Sender, event kind and remember flag are never encoded. A
    /// payload `to` is never encoded; `to` on the wire is always the
    /// server's addressing list.
    pub fn to_wire(&self) -> Value {
        let mut map = self.payload.as_map().clone();
        let _ = map.remove(ADDRESS_KEY);
        let c = &self.control;
        if let Some(ids) = &c.to {
            let _ = map.insert(ADDRESS_KEY.into(), ids_value(ids));
        }
        if let Some(serial) = c.serial {
            let _ = map.insert("_serial".into(), Value::from(serial));
        }
        if let Some(ts) = c.timestamp {
            let _ = map.insert("_time".into(), Value::from(ts));
        }
        if let Some(set) = &c.set {
            if let Ok(v) = serde_json::to_value(set) {
                let _ = map.insert("_set".into(), v);
            }
        }
        Value::Object(map)
    }
}

/// Wire key of the addressing list.
pub const ADDRESS_KEY: &str = "to";

fn ids_value(ids: &[ConnectionId]) -> Value {
    Value::Array(ids.iter().map(|id| Value::from(id.as_u64())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::from_raw(n)
    }

    #[test]
    fn control_fields_read_by_wire_name() {
        let mut msg = Message::from_connection(conn(3), EventKind::Transmit, Payload::text("hi"));
        msg.control.serial = Some(9);

        assert_eq!(msg.field("_event").as_deref(), Some(&json!("transmit")));
        assert_eq!(msg.field("_sender").as_deref(), Some(&json!(3)));
        assert_eq!(msg.field("_serial").as_deref(), Some(&json!(9)));
        assert_eq!(msg.field("text").as_deref(), Some(&json!("hi")));
        assert!(msg.field("_time").is_none());
    }

    #[test]
    fn remember_flag_absent_when_false() {
        let msg = Message::new(Payload::text("x"));
        assert!(msg.field("_remember").is_none());
        let msg = msg.remembered();
        assert_eq!(msg.field("_remember").as_deref(), Some(&json!(true)));
    }

    #[test]
    fn server_sender_reads_as_string() {
        let mut msg = Message::new(Payload::new());
        msg.control.sender = Some(Sender::Server);
        assert_eq!(msg.field("_sender").as_deref(), Some(&json!("server")));
        assert_eq!(msg.sender_connection(), None);
    }

    #[test]
    fn wire_hides_internal_fields() {
        let mut msg = Message::from_connection(conn(1), EventKind::Transmit, Payload::text("hi"))
            .remembered();
        msg.control.serial = Some(4);
        msg.control.timestamp = Some(1_700_000_000_100);

        let wire = msg.to_wire();
        assert_eq!(wire["text"], "hi");
        assert_eq!(wire["_serial"], 4);
        assert_eq!(wire["_time"], 1_700_000_000_100_i64);
        assert!(wire.get("_sender").is_none());
        assert!(wire.get("_event").is_none());
        assert!(wire.get("_remember").is_none());
        assert!(wire.get("to").is_none());
    }

    #[test]
    fn addressing_overrides_payload_to() {
        let payload = Payload::text("x").with("to", "everyone");
        let msg = Message::new(payload).to_connection(conn(5));
        assert_eq!(msg.to_wire()["to"], json!([5]));
        assert_eq!(msg.field("to").as_deref(), Some(&json!([5])));
    }

    #[test]
    fn payload_to_never_reaches_an_unaddressed_frame() {
        let payload = Payload::text("secret?").with("to", json!([2]));
        let msg = Message::new(payload);
        assert!(msg.to_wire().get("to").is_none());
        assert!(msg.field("to").is_none());
    }

    #[test]
    fn client_set_encoding() {
        let msg = Message::new(Payload::new()).with_set(ClientSet::last_seen(12));
        assert_eq!(msg.to_wire()["_set"], json!({"lastSeen": [12]}));

        let msg = Message::new(Payload::new()).with_set(ClientSet::renamed("a", "b"));
        assert_eq!(msg.to_wire()["_set"], json!({"name": "b", "rename": ["a", "b"]}));

        let msg = Message::new(Payload::new()).with_set(ClientSet::users(vec!["a".into()]));
        assert_eq!(msg.to_wire()["_set"], json!({"users": ["a"]}));
    }

    #[test]
    fn event_kind_serde() {
        assert_eq!(serde_json::to_string(&EventKind::Disconnect).unwrap(), r#""disconnect""#);
        assert_eq!(EventKind::Connect.to_string(), "connect");
    }
}
