use std::io;
use std::pin::Pin;
use std::collections::{HashMap, VecDeque};
use std::task::{Context, Poll, Waker};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use bytes::{Buf, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};
use super::frame::{Frame, FrameCodec, FrameKind, StreamId};
use super::state::StreamState;
use crate::config::{MuxConfig, INITIAL_WINDOW, MAX_FRAME_PAYLOAD};
use crate::error::{Error, Result};
use crate::util::io::AsyncStream;

/// Which end of the transport connection this multiplexer sits on. Decides the parity of the
/// stream identifiers it allocates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Dialed the connection; opens odd-numbered streams.
    Dialer,
    /// Accepted the connection; opens even-numbered streams.
    Listener,
}

impl Side {
    fn first_stream_num(self) -> u64 {
        match self {
            Side::Dialer => 1,
            Side::Listener => 2,
        }
    }

    fn allocates(self, stream_id: StreamId) -> bool {
        match self {
            Side::Dialer => stream_id.is_odd(),
            Side::Listener => !stream_id.is_odd(),
        }
    }
}

enum WriterMessage {
    Frame(Frame),
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Abort {
    Reset,
    Session,
}

enum Teardown {
    Clean,
    Failed(Error),
}

struct StreamEntry {
    state: StreamState,
    incoming: BytesMut,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
    send_credit: u64,
    // Bytes the peer may still send before we grant more.
    recv_window: u64,
    // Bytes consumed by the reader since the last window update.
    unacked: u64,
    remote_closed: bool,
    abort: Option<Abort>,
    has_reader: bool,
    has_writer: bool,
}

impl StreamEntry {
    fn new(state: StreamState) -> Self {
        StreamEntry {
            state,
            incoming: BytesMut::new(),
            read_waker: None,
            write_waker: None,
            send_credit: INITIAL_WINDOW,
            recv_window: INITIAL_WINDOW,
            unacked: 0,
            remote_closed: false,
            abort: None,
            has_reader: true,
            has_writer: true,
        }
    }

    fn wake_reader(&mut self) {
        if let Some(w) = self.read_waker.take() {
            w.wake()
        }
    }

    fn wake_writer(&mut self) {
        if let Some(w) = self.write_waker.take() {
            w.wake()
        }
    }
}

struct MuxShared {
    side: Side,
    config: MuxConfig,
    next_stream_num: u64,
    highest_remote: u64,
    streams: HashMap<StreamId, StreamEntry>,
    pending_accept: VecDeque<StreamId>,
    accept_waker: Option<Waker>,
    outgoing: Option<mpsc::UnboundedSender<WriterMessage>>,
    teardown: Option<Teardown>,
}

fn lock_shared(shared: &Mutex<MuxShared>) -> MutexGuard<'_, MuxShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MuxShared {
    fn new(side: Side, config: MuxConfig, outgoing: mpsc::UnboundedSender<WriterMessage>) -> Self {
        MuxShared {
            side,
            config,
            next_stream_num: side.first_stream_num(),
            highest_remote: 0,
            streams: HashMap::new(),
            pending_accept: VecDeque::new(),
            accept_waker: None,
            outgoing: Some(outgoing),
            teardown: None,
        }
    }

    fn send_frame(&mut self, frame: Frame) {
        trace!(stream = %frame.stream_id, kind = ?frame.kind, len = frame.payload.len(), "frame out");
        if let Some(tx) = &self.outgoing {
            // A closed channel means the writer has failed, which tears the session down anyway.
            let _ = tx.send(WriterMessage::Frame(frame));
        }
    }

    fn teardown_error(&self) -> Error {
        match &self.teardown {
            Some(Teardown::Failed(e)) => e.duplicate(),
            _ => Error::SessionClosed,
        }
    }

    fn abort_error(&self, abort: Abort) -> Error {
        match abort {
            Abort::Reset => Error::StreamReset,
            Abort::Session => self.teardown_error(),
        }
    }

    // Whether the identifier was ever allocated, by either side.
    fn was_opened(&self, stream_id: StreamId) -> bool {
        if self.side.allocates(stream_id) {
            stream_id.0 < self.next_stream_num
        }
        else {
            stream_id.0 <= self.highest_remote
        }
    }

    fn maybe_release(&mut self, stream_id: StreamId) {
        let release = match self.streams.get(&stream_id) {
            Some(entry) => entry.state.is_closed() && !entry.has_reader && !entry.has_writer,
            None => false,
        };
        if release {
            self.streams.remove(&stream_id);
            debug!(stream = %stream_id, "stream released");
        }
    }

    fn open_stream(&mut self) -> Result<StreamId> {
        if self.teardown.is_some() {
            return Err(self.teardown_error());
        }
        let stream_id = StreamId(self.next_stream_num);
        self.next_stream_num += 2;
        self.streams.insert(stream_id, StreamEntry::new(StreamState::OpenLocal));
        self.send_frame(Frame::open(stream_id));
        debug!(stream = %stream_id, "stream opened");
        Ok(stream_id)
    }

    fn poll_accept_id(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<StreamId>>> {
        if let Some(stream_id) = self.pending_accept.pop_front() {
            return Poll::Ready(Ok(Some(stream_id)));
        }
        match &self.teardown {
            Some(Teardown::Clean) => Poll::Ready(Ok(None)),
            Some(Teardown::Failed(e)) => Poll::Ready(Err(e.duplicate())),
            None => {
                self.accept_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// Applies one frame from the peer. An error means the framing can no longer be trusted
    /// and the whole connection must go.
    fn apply(&mut self, frame: Frame) -> Result<()> {
        trace!(stream = %frame.stream_id, kind = ?frame.kind, len = frame.payload.len(), "frame in");
        let stream_id = frame.stream_id;

        if frame.kind == FrameKind::Open {
            if self.side.allocates(stream_id) || stream_id.0 <= self.highest_remote {
                return Err(Error::Protocol(format!("peer opened invalid stream {}", stream_id)));
            }
            self.highest_remote = stream_id.0;
            if self.pending_accept.len() >= self.config.max_pending_accepts {
                warn!(stream = %stream_id, "too many streams awaiting accept; resetting");
                self.send_frame(Frame::reset(stream_id));
                return Ok(());
            }
            self.streams.insert(stream_id, StreamEntry::new(StreamState::OpenRemote));
            self.pending_accept.push_back(stream_id);
            if let Some(w) = self.accept_waker.take() {
                w.wake()
            }
            debug!(stream = %stream_id, "stream opened by peer");
            return Ok(());
        }

        if !self.streams.contains_key(&stream_id) {
            if self.was_opened(stream_id) {
                // Released locally; the peer may not have seen our reset yet.
                trace!(stream = %stream_id, kind = ?frame.kind, "dropping frame for released stream");
                return Ok(());
            }
            return Err(Error::Protocol(format!(
                "{:?} frame for unknown stream {}", frame.kind, stream_id)));
        }
        let entry = match self.streams.get_mut(&stream_id) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        match frame.kind {
            FrameKind::Open => {}
            FrameKind::Data => {
                if entry.abort.is_some() {
                    return Ok(());
                }
                if entry.remote_closed {
                    return Err(Error::Protocol(format!("data after close on stream {}", stream_id)));
                }
                let len = frame.payload.len() as u64;
                if len > entry.recv_window {
                    return Err(Error::Protocol(format!(
                        "stream {} exceeded its window: {} > {}", stream_id, len, entry.recv_window)));
                }
                if entry.has_reader {
                    entry.recv_window -= len;
                    entry.incoming.extend_from_slice(&frame.payload);
                    entry.wake_reader();
                }
                else if len > 0 {
                    // Nobody will read it; hand the credit straight back.
                    self.send_frame(Frame::window_update(stream_id, len));
                }
            }
            FrameKind::WindowUpdate => {
                let increment = frame.window_increment()?;
                if entry.abort.is_some() {
                    return Ok(());
                }
                entry.send_credit = entry.send_credit.checked_add(increment).ok_or_else(|| {
                    Error::Protocol(format!("window overflow on stream {}", stream_id))
                })?;
                entry.wake_writer();
            }
            FrameKind::Close => {
                if entry.abort.is_some() {
                    return Ok(());
                }
                entry.state = entry.state.remote_close().ok_or_else(|| {
                    Error::Protocol(format!("duplicate close on stream {}", stream_id))
                })?;
                entry.remote_closed = true;
                entry.wake_reader();
                debug!(stream = %stream_id, state = ?entry.state, "peer closed stream");
                self.maybe_release(stream_id);
            }
            FrameKind::Reset => {
                if entry.abort.is_none() {
                    entry.abort = Some(Abort::Reset);
                    // A message the peer finished before resetting is still complete.
                    if !entry.remote_closed {
                        entry.incoming.clear();
                    }
                }
                entry.state = StreamState::Closed;
                entry.wake_reader();
                entry.wake_writer();
                debug!(stream = %stream_id, "peer reset stream");
                self.maybe_release(stream_id);
            }
        }
        Ok(())
    }

    fn local_reset(&mut self, stream_id: StreamId) {
        let send = match self.streams.get_mut(&stream_id) {
            Some(entry) if entry.abort.is_none() => {
                let send = !entry.state.is_closed();
                entry.abort = Some(Abort::Reset);
                entry.state = StreamState::Closed;
                entry.incoming.clear();
                entry.wake_reader();
                entry.wake_writer();
                send
            }
            _ => false,
        };
        if send {
            debug!(stream = %stream_id, "resetting stream");
            self.send_frame(Frame::reset(stream_id));
        }
    }

    fn teardown(&mut self, reason: Teardown) {
        if self.teardown.is_some() {
            return;
        }
        match &reason {
            Teardown::Clean => debug!(streams = self.streams.len(), "session closed"),
            Teardown::Failed(e) => warn!(streams = self.streams.len(), error = %e, "session failed"),
        }
        self.teardown = Some(reason);

        // Streams nobody accepted have no handles to release them later.
        for stream_id in self.pending_accept.drain(..) {
            self.streams.remove(&stream_id);
        }
        for entry in self.streams.values_mut() {
            if entry.abort.is_none() && (!entry.state.is_closed() || !entry.incoming.is_empty()) {
                entry.abort = Some(Abort::Session);
            }
            entry.state = StreamState::Closed;
            entry.incoming.clear();
            entry.wake_reader();
            entry.wake_writer();
        }
        self.streams.retain(|_, entry| entry.has_reader || entry.has_writer);
        if let Some(w) = self.accept_waker.take() {
            w.wake()
        }
        if let Some(tx) = self.outgoing.take() {
            let _ = tx.send(WriterMessage::Shutdown);
        }
    }

    fn poll_read(
        &mut self,
        stream_id: StreamId,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let entry = match self.streams.get_mut(&stream_id) {
            Some(entry) => entry,
            None => return Poll::Ready(Err(self.teardown_error().into_io())),
        };

        if !entry.incoming.is_empty() {
            let amt = std::cmp::min(entry.incoming.len(), buf.remaining());
            buf.put_slice(&entry.incoming[..amt]);
            entry.incoming.advance(amt);
            entry.unacked += amt as u64;
            if entry.unacked >= INITIAL_WINDOW / 2 && !entry.remote_closed {
                let increment = entry.unacked;
                entry.unacked = 0;
                entry.recv_window += increment;
                self.send_frame(Frame::window_update(stream_id, increment));
            }
            return Poll::Ready(Ok(()));
        }
        match entry.abort {
            Some(Abort::Reset) if entry.remote_closed => return Poll::Ready(Ok(())),
            Some(abort) => return Poll::Ready(Err(self.abort_error(abort).into_io())),
            None => {}
        }
        if entry.remote_closed {
            return Poll::Ready(Ok(()));
        }
        if self.teardown.is_some() {
            return Poll::Ready(Err(self.teardown_error().into_io()));
        }
        entry.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn poll_write(
        &mut self,
        stream_id: StreamId,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let max_frame_size = self.config.max_frame_size;
        let entry = match self.streams.get_mut(&stream_id) {
            Some(entry) => entry,
            None => return Poll::Ready(Err(self.teardown_error().into_io())),
        };
        if let Some(abort) = entry.abort {
            return Poll::Ready(Err(self.abort_error(abort).into_io()));
        }
        if self.teardown.is_some() {
            return Poll::Ready(Err(self.teardown_error().into_io()));
        }
        if !entry.state.can_send() {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if entry.send_credit == 0 {
            trace!(stream = %stream_id, "waiting for send credit");
            entry.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let amt = std::cmp::min(buf.len() as u64, entry.send_credit)
            .min(max_frame_size as u64) as usize;
        entry.send_credit -= amt as u64;
        self.send_frame(Frame::data(stream_id, Bytes::copy_from_slice(&buf[..amt])));
        Poll::Ready(Ok(amt))
    }

    fn poll_flush(&mut self, stream_id: StreamId) -> Poll<io::Result<()>> {
        match self.streams.get(&stream_id).and_then(|entry| entry.abort) {
            Some(abort) => Poll::Ready(Err(self.abort_error(abort).into_io())),
            None if self.teardown.is_some() => Poll::Ready(Err(self.teardown_error().into_io())),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(&mut self, stream_id: StreamId) -> Poll<io::Result<()>> {
        let entry = match self.streams.get_mut(&stream_id) {
            Some(entry) => entry,
            None => return Poll::Ready(Err(self.teardown_error().into_io())),
        };
        if let Some(abort) = entry.abort {
            return Poll::Ready(Err(self.abort_error(abort).into_io()));
        }
        if let Some(state) = entry.state.local_close() {
            entry.state = state;
            debug!(stream = %stream_id, state = ?state, "closing stream");
            self.send_frame(Frame::close(stream_id));
        }
        Poll::Ready(Ok(()))
    }

    fn drop_reader(&mut self, stream_id: StreamId) {
        let mut credit = 0;
        let mut reset = false;
        if let Some(entry) = self.streams.get_mut(&stream_id) {
            entry.has_reader = false;
            entry.read_waker = None;
            if entry.abort.is_none() && !entry.remote_closed {
                credit = entry.incoming.len() as u64 + entry.unacked;
                entry.recv_window += credit;
                entry.unacked = 0;
            }
            entry.incoming.clear();
            reset = !entry.has_writer && entry.state.can_send();
        }
        if reset {
            self.local_reset(stream_id);
        }
        else if credit > 0 {
            self.send_frame(Frame::window_update(stream_id, credit));
        }
        self.maybe_release(stream_id);
    }

    fn drop_writer(&mut self, stream_id: StreamId) {
        let mut reset = false;
        let mut close = false;
        if let Some(entry) = self.streams.get_mut(&stream_id) {
            entry.has_writer = false;
            entry.write_waker = None;
            if entry.abort.is_none() && self.teardown.is_none() {
                // Abandoned with nothing left to read it: abort. Otherwise, or if the outbound
                // direction was already shut down, it is a clean half-close and any further
                // inbound data is discarded until the peer closes.
                if !entry.has_reader && entry.state.can_send() && !entry.remote_closed {
                    reset = true;
                }
                else if let Some(state) = entry.state.local_close() {
                    entry.state = state;
                    close = true;
                }
            }
        }
        if close {
            self.send_frame(Frame::close(stream_id));
        }
        if reset {
            self.local_reset(stream_id);
        }
        self.maybe_release(stream_id);
    }
}

async fn read_frames<R>(shared: Arc<Mutex<MuxShared>>, mut frames: FramedRead<R, FrameCodec>)
    where R: tokio::io::AsyncRead + Unpin
{
    let reason = loop {
        match frames.next().await {
            Some(Ok(frame)) => {
                if let Err(e) = lock_shared(&shared).apply(frame) {
                    break Teardown::Failed(e);
                }
            }
            Some(Err(e)) => break Teardown::Failed(e),
            None => break Teardown::Clean,
        }
    };
    lock_shared(&shared).teardown(reason);
}

async fn write_frames<W>(
    shared: Weak<Mutex<MuxShared>>,
    mut sink: FramedWrite<W, FrameCodec>,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
)
    where W: tokio::io::AsyncWrite + Unpin
{
    while let Some(msg) = rx.recv().await {
        let mut shutdown = false;
        let mut result = Ok(());
        if let WriterMessage::Frame(frame) = msg {
            result = sink.feed(frame).await;
            // Batch whatever else is already queued under one flush.
            while result.is_ok() {
                match rx.try_recv() {
                    Ok(WriterMessage::Frame(frame)) => result = sink.feed(frame).await,
                    Ok(WriterMessage::Shutdown) => {
                        shutdown = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
            if result.is_ok() {
                result = sink.flush().await;
            }
        }
        else {
            shutdown = true;
        }

        if let Err(e) = result {
            if let Some(shared) = shared.upgrade() {
                lock_shared(&shared).teardown(Teardown::Failed(e));
            }
            return;
        }
        if shutdown {
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "error shutting down transport");
    }
}

/// Splits one transport connection into many independent streams.
///
/// Frames are decoded by a dedicated reader task and written by a dedicated writer task, so
/// the caller must be inside a tokio runtime. Dropping the `Mux` closes the connection.
pub struct Mux {
    shared: Arc<Mutex<MuxShared>>,
    reader_task: JoinHandle<()>,
}

impl Mux {
    pub fn new<T>(transport: T, side: Side, config: MuxConfig) -> Self
        where T: AsyncStream + 'static
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(MuxShared::new(side, config, tx)));
        let frames = FramedRead::new(read_half, FrameCodec::new(MAX_FRAME_PAYLOAD));
        let sink = FramedWrite::new(write_half, FrameCodec::new(MAX_FRAME_PAYLOAD));
        tokio::spawn(write_frames(Arc::downgrade(&shared), sink, rx));
        let reader_task = tokio::spawn(read_frames(shared.clone(), frames));
        Mux { shared, reader_task }
    }

    pub fn side(&self) -> Side {
        lock_shared(&self.shared).side
    }

    pub fn open_stream(&self) -> Result<Stream> {
        let stream_id = lock_shared(&self.shared).open_stream()?;
        Ok(Stream::new(stream_id, self.shared.clone()))
    }

    /// Waits for the peer to open a stream. Resolves to `None` once the connection has closed
    /// cleanly. Only one task should be accepting at a time.
    pub fn accept_stream(&self) -> Accept<'_> {
        Accept { mux: self }
    }

    pub fn close(&self) {
        lock_shared(&self.shared).teardown(Teardown::Clean);
        self.reader_task.abort();
    }

    pub fn is_closed(&self) -> bool {
        lock_shared(&self.shared).teardown.is_some()
    }

    /// Streams currently held in the session's map, including closed ones that still have
    /// live handles.
    pub fn stream_count(&self) -> usize {
        lock_shared(&self.shared).streams.len()
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct Accept<'a> {
    mux: &'a Mux,
}

impl<'a> Future for Accept<'a> {
    type Output = Result<Option<Stream>>;
    fn poll(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Self::Output> {
        let shared = &Pin::into_inner(self).mux.shared;
        match lock_shared(shared).poll_accept_id(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(None)) => Poll::Ready(Ok(None)),
            Poll::Ready(Ok(Some(stream_id))) => Poll::Ready(Ok(Some(Stream::new(
                stream_id,
                shared.clone())))),
        }
    }
}

fn stream_state(shared: &Mutex<MuxShared>, stream_id: StreamId) -> StreamState {
    lock_shared(shared).streams.get(&stream_id)
        .map(|entry| entry.state)
        .unwrap_or(StreamState::Closed)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                                                                                //
//                                          StreamReader                                          //
//                                                                                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Inbound half of a stream. Reads return end-of-file once the peer has closed its direction.
pub struct StreamReader {
    stream_id: StreamId,
    shared: Arc<Mutex<MuxShared>>,
}

impl StreamReader {
    pub fn id(&self) -> StreamId {
        self.stream_id
    }

    pub fn state(&self) -> StreamState {
        stream_state(&self.shared, self.stream_id)
    }

    pub fn reset(&self) {
        lock_shared(&self.shared).local_reset(self.stream_id);
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        lock_shared(&self.shared).drop_reader(self.stream_id);
    }
}

impl AsyncRead for StreamReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>
    ) -> Poll<io::Result<()>> {
        let iself = Pin::into_inner(self);
        lock_shared(&iself.shared).poll_read(iself.stream_id, cx, buf)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                                                                                //
//                                          StreamWriter                                          //
//                                                                                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Outbound half of a stream. `shutdown` half-closes; so does dropping it.
pub struct StreamWriter {
    stream_id: StreamId,
    shared: Arc<Mutex<MuxShared>>,
}

impl StreamWriter {
    pub fn id(&self) -> StreamId {
        self.stream_id
    }

    pub fn state(&self) -> StreamState {
        stream_state(&self.shared, self.stream_id)
    }

    pub fn reset(&self) {
        lock_shared(&self.shared).local_reset(self.stream_id);
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        lock_shared(&self.shared).drop_writer(self.stream_id);
    }
}

impl AsyncWrite for StreamWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8]
    ) -> Poll<io::Result<usize>> {
        let iself = Pin::into_inner(self);
        lock_shared(&iself.shared).poll_write(iself.stream_id, cx, buf)
    }

    // Frames are queued for the connection's writer task as soon as they are written.
    fn poll_flush(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>
    ) -> Poll<io::Result<()>> {
        let iself = Pin::into_inner(self);
        lock_shared(&iself.shared).poll_flush(iself.stream_id)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>
    ) -> Poll<io::Result<()>> {
        let iself = Pin::into_inner(self);
        lock_shared(&iself.shared).poll_shutdown(iself.stream_id)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                                                                                //
//                                             Stream                                             //
//                                                                                                //
////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct Stream {
    reader: StreamReader,
    writer: StreamWriter,
}

impl Stream {
    fn new(stream_id: StreamId, shared: Arc<Mutex<MuxShared>>) -> Self {
        Stream {
            reader: StreamReader {
                stream_id,
                shared: shared.clone(),
            },
            writer: StreamWriter {
                stream_id,
                shared,
            }
        }
    }

    pub fn id(&self) -> StreamId {
        self.reader.stream_id
    }

    pub fn state(&self) -> StreamState {
        self.reader.state()
    }

    /// Aborts the exchange in both directions, discarding buffered data.
    pub fn reset(&self) {
        self.reader.reset();
    }

    pub fn split(self) -> (StreamReader, StreamWriter) {
        (self.reader, self.writer)
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>
    ) -> Poll<io::Result<()>> {
        let iself = Pin::into_inner(self);
        Pin::new(&mut iself.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8]
    ) -> Poll<io::Result<usize>> {
        let iself = Pin::into_inner(self);
        Pin::new(&mut iself.writer).poll_write(cx, buf)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<io::Result<()>> {
        let iself = Pin::into_inner(self);
        Pin::new(&mut iself.writer).poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<io::Result<()>> {
        let iself = Pin::into_inner(self);
        Pin::new(&mut iself.writer).poll_shutdown(cx)
    }
}
