//! Connection state machine.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Local-initiated close: sends CONNECTION_CLOSE on receipt of further
    /// packets (up to three total) and waits one PTO before closing.
    Closing,
    /// Peer-initiated close: emits nothing, waits three PTOs before closing.
    Draining,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn accepts_application_sends(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}
