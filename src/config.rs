/// Largest frame payload either side will accept. Part of the wire protocol.
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// Credit each stream starts with in each direction. Part of the wire protocol.
pub const INITIAL_WINDOW: u64 = 256 * 1024;

pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;
pub const DEFAULT_MAX_PENDING_ACCEPTS: usize = 1024;

/// Local tuning of a multiplexer.
#[derive(Clone, Debug)]
pub struct MuxConfig {
    /// Data written to a stream is split into frames of at most this many bytes, so that one
    /// busy stream cannot hold the connection for long between other streams' frames.
    pub max_frame_size: usize,
    /// Streams opened by the peer but not yet accepted locally. Further opens are reset.
    pub max_pending_accepts: usize,
}

impl MuxConfig {
    pub fn new() -> Self {
        MuxConfig {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_pending_accepts: DEFAULT_MAX_PENDING_ACCEPTS,
        }
    }

    /// Clamped to `1..=MAX_FRAME_PAYLOAD`.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.clamp(1, MAX_FRAME_PAYLOAD);
        self
    }

    pub fn max_pending_accepts(mut self, limit: usize) -> Self {
        self.max_pending_accepts = limit;
        self
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self::new()
    }
}
