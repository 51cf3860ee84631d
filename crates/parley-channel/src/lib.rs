//! # parley-channel
//!
//! The chat channel and its building blocks:
//!
//! - [`pipeline`]: ordered, pattern-dispatched stages over a mutable message
//! - [`registry`]: connected users indexed by connection, name and session
//! - [`history`]: bounded, serially numbered message log
//! - [`names`]: display-name truncation and fallback generation
//! - [`channel`]: the stage list that implements every chat rule
//! - [`worker`]: runs a [`Channel`] on its own task behind a [`ChannelHandle`]

#![deny(unsafe_code)]

pub mod channel;
pub mod clock;
pub mod errors;
pub mod history;
pub mod names;
pub mod pipeline;
pub mod registry;
pub mod worker;

pub use channel::{Channel, ChannelSink};
pub use clock::{Clock, SystemClock};
pub use errors::{ChannelError, RegistryError};
pub use history::{HistoryLog, HistoryRecord};
pub use pipeline::{Flow, Pattern, Pipeline, RunOutcome};
pub use registry::{ChatUser, Lookup, UserPatch, UserRegistry};
pub use worker::{ChannelCommand, ChannelHandle, spawn_channel};
