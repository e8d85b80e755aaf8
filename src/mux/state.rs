/// Lifecycle of one stream.
///
/// ```text
/// OpenLocal / OpenRemote ──local close──▶ HalfClosedLocal ──remote close──▶ Closed
///                        ──remote close─▶ HalfClosedRemote ──local close──▶ Closed
/// any state ──reset / connection failure──▶ Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Opened by this side, both directions open.
    OpenLocal,
    /// Opened by the peer, both directions open.
    OpenRemote,
    /// This side sent its close; the peer may still send.
    HalfClosedLocal,
    /// The peer sent its close; this side may still send.
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    pub fn can_send(self) -> bool {
        matches!(self, StreamState::OpenLocal | StreamState::OpenRemote | StreamState::HalfClosedRemote)
    }

    pub fn can_receive(self) -> bool {
        matches!(self, StreamState::OpenLocal | StreamState::OpenRemote | StreamState::HalfClosedLocal)
    }

    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }

    /// Transition for sending our close. Returns `None` if the send direction is already shut.
    pub fn local_close(self) -> Option<StreamState> {
        match self {
            StreamState::OpenLocal | StreamState::OpenRemote => Some(StreamState::HalfClosedLocal),
            StreamState::HalfClosedRemote => Some(StreamState::Closed),
            StreamState::HalfClosedLocal | StreamState::Closed => None,
        }
    }

    /// Transition for receiving the peer's close. Returns `None` if the peer had already closed,
    /// which is a protocol violation.
    pub fn remote_close(self) -> Option<StreamState> {
        match self {
            StreamState::OpenLocal | StreamState::OpenRemote => Some(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => Some(StreamState::Closed),
            StreamState::HalfClosedRemote | StreamState::Closed => None,
        }
    }
}
