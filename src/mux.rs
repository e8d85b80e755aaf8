//! Stream multiplexing over a single transport connection.
//!
//! Wire format: a sequence of frames, each `varint(stream << 3 | kind) varint(len) payload`.
//! Streams opened by the dialing side are odd-numbered, those opened by the accepting side are
//! even-numbered, so neither side has to coordinate identifiers with the other.

mod frame;
mod state;
mod stream;

pub use frame::{Frame, FrameCodec, FrameKind, StreamId};
pub use state::StreamState;
pub use stream::{
    Mux,
    Accept,
    Side,
    Stream,
    StreamReader,
    StreamWriter,
};
