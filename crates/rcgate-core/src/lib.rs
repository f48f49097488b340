//! Core types for rcgate.
//!
//! This crate holds the pieces every other rcgate crate agrees on: the
//! credentials used to talk to the managed client, the connection state cell,
//! the update-event wire format, and the shape of messages republished
//! downstream.

mod api;
mod change;
mod event;
mod params;
mod poll;
mod state;

pub use api::{ApiResponse, ManagedClientError};
pub use change::{ChangeEvent, PublishedMessage};
pub use event::{
    EVENT_OPCODE, FrameError, JSON_API_EVENT, RcuEvent, RcuEventType, SUBSCRIBE_OPCODE, parse_frame,
    subscribe_frame,
};
pub use params::{AUTH_USERNAME, ConnectionParameters, ParametersError};
pub use poll::poll_until;
pub use state::{AtomicConnectionState, ConnectionState};
