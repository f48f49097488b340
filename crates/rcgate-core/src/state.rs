//! Connection lifecycle state.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a connection attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No session and no attempt in flight.
    Disconnected,
    /// Obtaining parameters from the connection strategy.
    WaitingForProcess,
    /// Probing the REST endpoint.
    WaitingForRestReady,
    /// Opening the event WebSocket.
    WaitingForWebsocketConnection,
    /// Fully connected.
    Connected,
}

impl ConnectionState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::WaitingForProcess => 1,
            Self::WaitingForRestReady => 2,
            Self::WaitingForWebsocketConnection => 3,
            Self::Connected => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WaitingForProcess,
            2 => Self::WaitingForRestReady,
            3 => Self::WaitingForWebsocketConnection,
            4 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::WaitingForProcess => "WAITING_FOR_PROCESS",
            Self::WaitingForRestReady => "WAITING_FOR_REST_READY",
            Self::WaitingForWebsocketConnection => "WAITING_FOR_WEBSOCKET_CONNECTION",
            Self::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

/// A `ConnectionState` that can only change through compare-and-swap or a
/// forced reset.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected.to_u8()))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. On failure returns the state actually held.
    pub fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ConnectionState::from_u8)
    }

    /// Force the cell back to `Disconnected`, returning the previous state.
    pub fn reset(&self) -> ConnectionState {
        ConnectionState::from_u8(
            self.0
                .swap(ConnectionState::Disconnected.to_u8(), Ordering::AcqRel),
        )
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_disconnected() {
        assert_eq!(AtomicConnectionState::new().load(), ConnectionState::Disconnected);
    }

    #[test]
    fn transition_reports_actual_state() {
        let cell = AtomicConnectionState::new();
        cell.transition(ConnectionState::Disconnected, ConnectionState::WaitingForProcess)
            .unwrap();
        let err = cell
            .transition(ConnectionState::Disconnected, ConnectionState::WaitingForProcess)
            .unwrap_err();
        assert_eq!(err, ConnectionState::WaitingForProcess);
        assert_eq!(cell.reset(), ConnectionState::WaitingForProcess);
        assert_eq!(cell.load(), ConnectionState::Disconnected);
    }

    #[test]
    fn only_one_racer_wins() {
        let cell = Arc::new(AtomicConnectionState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    cell.transition(ConnectionState::Disconnected, ConnectionState::WaitingForProcess)
                        .is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
