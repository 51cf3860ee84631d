//! The chat channel: every business rule, expressed as pipeline stages.
//!
//! Stage order is fixed:
//!
//! | # | stage        | runs when                          | terminates |
//! |---|--------------|------------------------------------|------------|
//! | 1 | connect      | `_event = connect`                 | yes        |
//! | 2 | disconnect   | `_event = disconnect`              | yes        |
//! | 3 | rename       | `request = rename`                 | yes        |
//! | 4 | identify     | `request = identify`               | yes        |
//! | 5 | history      | `request = history`                | yes        |
//! | 6 | direct       | `recipient` set, `_event = transmit` | yes      |
//! | 7 | transmit     | `_event = transmit`                | if unidentified |
//! | 8 | timestamp    | always                             | no         |
//! | 9 | erase_sender | always                             | no         |
//! | 10 | persist     | `_remember`                        | no         |
//! | 11 | broadcast   | always                             | no         |
//!
//! Stages never call back into the channel. Announcements and private
//! replies they produce are queued and each runs the whole pipeline right
//! after the message that produced them, before the next inbound message.

use std::collections::VecDeque;
use std::sync::Arc;

use parley_core::{ADDRESS_KEY, ClientSet, ConnectionId, Message, Payload, Sender, SessionToken};
use parley_settings::ChannelSettings;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock, Timestamper};
use crate::history::{HistoryLog, HistoryRecord};
use crate::names::{generate_name, truncate_name};
use crate::pipeline::{Flow, Pattern, Pipeline};
use crate::registry::{ChatUser, Lookup, UserPatch, UserRegistry};

/// Delivery side of the channel, implemented by the connection relay.
pub trait ChannelSink: Send + Sync {
    /// Let `connection` receive broadcasts from now on.
    fn approve_listener(&self, connection: ConnectionId);

    /// Deliver a finished message to its addressees (or every approved
    /// listener when it has none).
    fn broadcast(&self, message: &Message);
}

/// Everything the stages read and write.
pub struct ChannelState {
    registry: UserRegistry,
    history: HistoryLog,
    timestamps: Timestamper,
    clock: Box<dyn Clock>,
    rng: StdRng,
    sink: Arc<dyn ChannelSink>,
    max_name_length: usize,
    pending: VecDeque<Message>,
}

impl ChannelState {
    fn reply(&mut self, to: ConnectionId, payload: Payload) {
        self.pending.push_back(Message::new(payload).to_connection(to));
    }

    fn reply_text(&mut self, to: ConnectionId, text: impl Into<String>) {
        self.reply(to, Payload::text(text));
    }

    fn instruct(&mut self, to: ConnectionId, set: ClientSet) {
        self.pending
            .push_back(Message::new(Payload::new()).to_connection(to).with_set(set));
    }

    fn announce(&mut self, text: String) {
        self.pending
            .push_back(Message::new(Payload::text(text)).remembered());
    }

    fn publish_user_list(&mut self) {
        let names = self.registry.names();
        self.pending
            .push_back(Message::new(Payload::new()).with_set(ClientSet::users(names)));
    }

    fn name_taken(&self, name: &str) -> bool {
        self.registry.find(Lookup::Name(name)).is_some()
    }

    fn user_on(&self, connection: ConnectionId) -> Option<&ChatUser> {
        self.registry.find(Lookup::Connection(connection))
    }
}

/// One chat room. Not thread-safe by itself; run it behind
/// [`spawn_channel`](crate::worker::spawn_channel).
pub struct Channel {
    pipeline: Pipeline<ChannelState, Message>,
    state: ChannelState,
}

impl Channel {
    /// Empty channel delivering through `sink`.
    pub fn new(settings: &ChannelSettings, sink: Arc<dyn ChannelSink>) -> Self {
        Self {
            pipeline: build_pipeline(),
            state: ChannelState {
                registry: UserRegistry::new(),
                history: HistoryLog::new(settings.max_history, settings.history_retain_ratio),
                timestamps: Timestamper::new(),
                clock: Box::new(SystemClock),
                rng: StdRng::from_os_rng(),
                sink,
                max_name_length: settings.max_name_length,
                pending: VecDeque::new(),
            },
        }
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.state.clock = Box::new(clock);
        self
    }

    /// Replace the name generator's random source.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.state.rng = rng;
        self
    }

    /// Run a message, and everything it gives rise to, through the pipeline.
    ///
    /// A message without a sender is treated as coming from the server.
    pub fn receive(&mut self, message: Message) {
        self.process(message);
        while let Some(next) = self.state.pending.pop_front() {
            self.process(next);
        }
    }

    /// Receive arbitrary JSON from the server side.
    ///
    /// Objects become the payload (reserved keys are dropped); anything else
    /// becomes `{text: value}`.
    pub fn receive_value(&mut self, value: Value) {
        let payload = match value {
            Value::Object(map) => map.into_iter().fold(Payload::new(), |p, (k, v)| p.with(&k, v)),
            Value::String(s) => Payload::text(s),
            other => Payload::new().with("text", other),
        };
        self.receive(Message::new(payload));
    }

    /// History records with serials in `[first, last]`.
    pub fn retrieve(&self, first: u64, last: u64) -> Vec<HistoryRecord> {
        self.state
            .history
            .retrieve(first, last)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Identified users.
    pub fn registry(&self) -> &UserRegistry {
        &self.state.registry
    }

    /// Persisted messages.
    pub fn history(&self) -> &HistoryLog {
        &self.state.history
    }

    fn process(&mut self, mut message: Message) {
        let sender = *message.control.sender.get_or_insert(Sender::Server);
        let outcome = self.pipeline.run(&mut self.state, &mut message);
        debug!(
            sender = ?sender,
            event = ?message.control.event,
            stages = ?outcome.ran,
            terminated_by = outcome.terminated_by,
            "message processed"
        );
    }
}

fn build_pipeline() -> Pipeline<ChannelState, Message> {
    Pipeline::new()
        .stage_when("connect", Pattern::new().eq("_event", "connect"), on_connect)
        .stage_when("disconnect", Pattern::new().eq("_event", "disconnect"), on_disconnect)
        .stage_when("rename", Pattern::new().eq("request", "rename"), on_rename)
        .stage_when("identify", Pattern::new().eq("request", "identify"), on_identify)
        .stage_when("history", Pattern::new().eq("request", "history"), on_history)
        .stage_when(
            "direct",
            Pattern::new().present("recipient").eq("_event", "transmit"),
            on_direct,
        )
        .stage_when("transmit", Pattern::new().eq("_event", "transmit"), on_transmit)
        .stage("timestamp", assign_timestamp)
        .stage("erase_sender", erase_sender)
        .stage_when("persist", Pattern::new().eq("_remember", true), persist)
        .stage("broadcast", broadcast)
}

// ── stages ──────────────────────────────────────────────────────────

fn on_connect(_: &mut ChannelState, message: &mut Message) -> Flow {
    if let Some(conn) = message.sender_connection() {
        debug!(conn_id = %conn, "connection opened");
    }
    Flow::Terminate
}

fn on_disconnect(state: &mut ChannelState, message: &mut Message) -> Flow {
    let Some(conn) = message.sender_connection() else {
        return Flow::Terminate;
    };
    match state.registry.delete(conn) {
        Ok(user) => {
            info!(conn_id = %conn, name = %user.name, "user left");
            state.announce(format!("{} disconnected", user.name));
            state.publish_user_list();
        }
        Err(err) => debug!(conn_id = %conn, error = %err, "disconnect without identity"),
    }
    Flow::Terminate
}

fn on_rename(state: &mut ChannelState, message: &mut Message) -> Flow {
    let Some(conn) = message.sender_connection() else {
        return Flow::Terminate;
    };
    let Some(current) = state.user_on(conn).map(|u| u.name.clone()) else {
        state.reply_text(conn, "Identify before renaming");
        return Flow::Terminate;
    };

    let requested = message.payload.get_str("name").unwrap_or_default();
    let proposed = truncate_name(requested, state.max_name_length);

    if proposed == current {
        state.reply_text(conn, format!("You are already named {current}"));
        return Flow::Terminate;
    }

    let rejection = if proposed.is_empty() {
        Some("Name cannot be empty".to_string())
    } else {
        match state.registry.update(conn, UserPatch::name(proposed.clone())) {
            Ok(_) => None,
            Err(err) => {
                debug!(conn_id = %conn, error = %err, "rename refused");
                Some(format!("The name {proposed} is already taken"))
            }
        }
    };

    match rejection {
        Some(text) => {
            state.pending.push_back(
                Message::new(Payload::text(text))
                    .to_connection(conn)
                    .with_set(ClientSet::name(current)),
            );
        }
        None => {
            info!(conn_id = %conn, from = %current, to = %proposed, "user renamed");
            state.announce(format!("{current} is now known as {proposed}"));
            state.instruct(conn, ClientSet::renamed(current, proposed));
            state.publish_user_list();
        }
    }
    Flow::Terminate
}

fn on_identify(state: &mut ChannelState, message: &mut Message) -> Flow {
    let Some(conn) = message.sender_connection() else {
        return Flow::Terminate;
    };
    state.sink.approve_listener(conn);

    if let Some(existing) = state.user_on(conn).map(|u| u.name.clone()) {
        state.pending.push_back(
            Message::new(Payload::text(format!("Already identified as {existing}")))
                .to_connection(conn)
                .with_set(ClientSet::name(existing)),
        );
        return Flow::Terminate;
    }

    let session = message
        .payload
        .get_str("session")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(SessionToken::generate, SessionToken::from_raw);
    if state.registry.find(Lookup::Session(&session)).is_some() {
        debug!(conn_id = %conn, "identify with a session already in use");
        state.reply_text(conn, "Session already in use");
        return Flow::Terminate;
    }

    let requested = truncate_name(
        message.payload.get_str("name").unwrap_or_default(),
        state.max_name_length,
    );
    let name = if requested.is_empty() || state.name_taken(&requested) {
        let registry = &state.registry;
        generate_name(&mut state.rng, state.max_name_length, |candidate| {
            registry.find(Lookup::Name(candidate)).is_some()
        })
    } else {
        requested
    };

    let user = ChatUser {
        connection: conn,
        session,
        name: name.clone(),
    };
    if let Err(err) = state.registry.create(user) {
        warn!(conn_id = %conn, index = err.index(), error = %err, "identify failed");
        state.reply_text(conn, err.to_string());
        return Flow::Terminate;
    }

    info!(conn_id = %conn, name = %name, "user identified");
    let last_serial = state.history.last_serial();
    state.instruct(conn, ClientSet::name(name.clone()));
    state.instruct(conn, ClientSet::last_seen(last_serial));
    state.announce(format!("{name} joined"));
    state.publish_user_list();
    Flow::Terminate
}

fn on_history(state: &mut ChannelState, message: &mut Message) -> Flow {
    let Some(conn) = message.sender_connection() else {
        return Flow::Terminate;
    };
    let first = message.payload.get_u64("first").unwrap_or(0);
    let last = message.payload.get_u64("last").unwrap_or(u64::MAX);
    let records: Vec<Value> = state
        .history
        .retrieve(first, last)
        .into_iter()
        .map(HistoryRecord::to_wire)
        .collect();
    debug!(conn_id = %conn, first, last, count = records.len(), "history requested");
    if !records.is_empty() {
        state.reply(conn, Payload::new().with("history", Value::Array(records)));
    }
    Flow::Terminate
}

fn on_direct(state: &mut ChannelState, message: &mut Message) -> Flow {
    let Some(conn) = message.sender_connection() else {
        return Flow::Terminate;
    };
    let recipient = message
        .payload
        .get_str("recipient")
        .and_then(|name| state.registry.find(Lookup::Name(name)))
        .map(|u| u.connection);
    let Some(recipient) = recipient else {
        state.reply_text(conn, "Recipient not found");
        return Flow::Terminate;
    };
    let Some(sender_name) = state.user_on(conn).map(|u| u.name.clone()) else {
        debug!(conn_id = %conn, "direct message from unidentified connection dropped");
        return Flow::Terminate;
    };

    let delivery = message.payload.clone().with("name", sender_name);
    state.reply(recipient, delivery.clone());
    if recipient != conn {
        state.reply(conn, delivery);
    }
    debug!(conn_id = %conn, recipient = %recipient, "direct message routed");
    Flow::Terminate
}

fn on_transmit(state: &mut ChannelState, message: &mut Message) -> Flow {
    let Some(conn) = message.sender_connection() else {
        return Flow::Continue;
    };
    let Some(name) = state.user_on(conn).map(|u| u.name.clone()) else {
        debug!(conn_id = %conn, "transmit from unidentified connection dropped");
        return Flow::Terminate;
    };
    let _ = message.payload.insert("name", name);
    // Clients cannot address their own messages.
    let _ = message.payload.remove(ADDRESS_KEY);
    message.control.remember = true;
    Flow::Continue
}

fn assign_timestamp(state: &mut ChannelState, message: &mut Message) -> Flow {
    let now = state.clock.now_millis();
    message.control.timestamp = Some(state.timestamps.next(now));
    Flow::Continue
}

fn erase_sender(_: &mut ChannelState, message: &mut Message) -> Flow {
    message.control.sender = None;
    Flow::Continue
}

fn persist(state: &mut ChannelState, message: &mut Message) -> Flow {
    message.control.remember = false;
    let timestamp = message.control.timestamp.unwrap_or_default();
    let serial = state.history.append(timestamp, message.payload.clone());
    message.control.serial = Some(serial);
    debug!(serial, "message persisted");
    Flow::Continue
}

fn broadcast(state: &mut ChannelState, message: &mut Message) -> Flow {
    state.sink.broadcast(message);
    Flow::Continue
}
