//! Adapting streams to requests and responses, for both roles.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use futures::future::BoxFuture;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};
use crate::error::{Error, Result};
use crate::message::{self, Body, Headers, Request, RequestHead, Response, ResponseHead};
use crate::mux::{Stream, StreamId, StreamReader, StreamWriter};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Application logic on the serving side: given a request and a sink for the response,
/// produce the response.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request, response: ResponseWriter) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
    where F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = HandlerResult> + Send + 'static
{
    fn handle(&self, request: Request, response: ResponseWriter) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(request, response))
    }
}

struct Sink {
    writer: StreamWriter,
    head_sent: bool,
    closed: bool,
}

impl Sink {
    async fn send_head(&mut self, head: &ResponseHead) -> Result<()> {
        if !self.head_sent {
            let encoded = head.encode()?;
            self.head_sent = true;
            self.writer.write_all(&encoded).await.map_err(Error::from_io)?;
        }
        Ok(())
    }

    async fn write(&mut self, head: &ResponseHead, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Io(io::ErrorKind::BrokenPipe.into()));
        }
        self.send_head(head).await?;
        self.writer.write_all(data).await.map_err(Error::from_io)
    }

    async fn finish(&mut self, head: &ResponseHead) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.send_head(head).await?;
        self.closed = true;
        self.writer.shutdown().await.map_err(Error::from_io)
    }

    async fn fail(&mut self, message: &str) {
        if self.closed {
            return;
        }
        if self.head_sent {
            // Too late to change the status; a truncated body must not look complete.
            self.closed = true;
            self.writer.reset();
            return;
        }
        let mut head = ResponseHead::new(500);
        head.headers.insert("Content-Type", "text/plain");
        let result = match self.write(&head, message.as_bytes()).await {
            Ok(()) => self.finish(&head).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(stream = %self.writer.id(), error = %e, "could not send error response");
            self.writer.reset();
        }
    }
}

struct ResponseShared {
    stream_id: StreamId,
    head: Mutex<ResponseHead>,
    sink: tokio::sync::Mutex<Sink>,
}

impl ResponseShared {
    fn head(&self) -> MutexGuard<'_, ResponseHead> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn head_snapshot(&self) -> ResponseHead {
        self.head().clone()
    }
}

/// Where a handler writes its response. The head goes out with the first body write or when
/// the response is finished; until then status and headers may still be changed. Once the
/// handler returns the stream's outbound direction is closed whether or not `finish` was
/// called.
pub struct ResponseWriter {
    shared: Arc<ResponseShared>,
}

impl ResponseWriter {
    pub fn stream_id(&self) -> StreamId {
        self.shared.stream_id
    }

    pub fn set_status(&mut self, status: u16) {
        let mut head = self.shared.head();
        head.status = status;
        head.reason = String::from(message::canonical_reason(status));
    }

    pub fn set_reason<R: Into<String>>(&mut self, reason: R) {
        self.shared.head().reason = reason.into();
    }

    pub fn insert_header<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.shared.head().headers.insert(name, value);
    }

    pub fn headers(&self) -> Headers {
        self.shared.head().headers.clone()
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let head = self.shared.head_snapshot();
        self.shared.sink.lock().await.write(&head, data).await
    }

    /// Sends the head if still pending and closes the outbound direction.
    pub async fn finish(self) -> Result<()> {
        let head = self.shared.head_snapshot();
        self.shared.sink.lock().await.finish(&head).await
    }
}

/// Serves one accepted stream with `handler`. Runs as its own task, one per stream.
pub(crate) async fn serve_stream<H: Handler>(stream: Stream, handler: Arc<H>) {
    let stream_id = stream.id();
    let (reader, writer) = stream.split();
    let shared = Arc::new(ResponseShared {
        stream_id,
        head: Mutex::new(ResponseHead::default()),
        sink: tokio::sync::Mutex::new(Sink { writer, head_sent: false, closed: false }),
    });

    let mut reader = BufReader::new(reader);
    let head = match message::read_request_head(&mut reader).await {
        Ok(head) => head,
        Err(e) => {
            warn!(stream = %stream_id, error = %e, "bad request");
            let mut head = ResponseHead::new(400);
            head.headers.insert("Content-Type", "text/plain");
            let mut sink = shared.sink.lock().await;
            let result = match sink.write(&head, e.to_string().as_bytes()).await {
                Ok(()) => sink.finish(&head).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                debug!(stream = %stream_id, error = %e, "could not send bad request response");
                sink.writer.reset();
            }
            return;
        }
    };
    debug!(stream = %stream_id, method = %head.method, path = %head.path, "dispatching request");

    let request = Request { head, body: Body::new(reader) };
    let response = ResponseWriter { shared: shared.clone() };
    // The handler runs in a task of its own so that a panic stays contained to this stream.
    let failure = match tokio::spawn(handler.handle(request, response)).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) if e.is_panic() => Some(String::from("handler panicked")),
        Err(_) => Some(String::from("handler cancelled")),
    };

    let head = shared.head_snapshot();
    let mut sink = shared.sink.lock().await;
    match failure {
        None => {
            if let Err(e) = sink.finish(&head).await {
                debug!(stream = %stream_id, error = %e, "could not finish response");
            }
        }
        Some(message) => {
            warn!(stream = %stream_id, error = %message, "handler failed");
            sink.fail(&message).await;
        }
    }
}

/// A request whose body is still being written. Implements `AsyncWrite` for the body;
/// [`PendingRequest::finish`] ends the body and waits for the response.
pub struct PendingRequest {
    reader: StreamReader,
    writer: StreamWriter,
}

impl PendingRequest {
    pub(crate) async fn start(stream: Stream, head: &RequestHead) -> Result<PendingRequest> {
        let encoded = head.encode()?;
        let (reader, mut writer) = stream.split();
        if let Err(e) = writer.write_all(&encoded).await {
            writer.reset();
            return Err(Error::from_io(e));
        }
        debug!(stream = %writer.id(), method = %head.method, path = %head.path, "request sent");
        Ok(PendingRequest { reader, writer })
    }

    pub fn stream_id(&self) -> StreamId {
        self.writer.id()
    }

    /// Abandons the request; the peer sees the stream reset.
    pub fn reset(&self) {
        self.writer.reset();
    }

    pub async fn finish(mut self) -> Result<Response> {
        self.writer.shutdown().await.map_err(Error::from_io)?;
        let mut reader = BufReader::new(self.reader);
        let head = message::read_response_head(&mut reader).await?;
        Ok(Response { head, body: Body::new(reader) })
    }
}

impl AsyncWrite for PendingRequest {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8]
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut Pin::into_inner(self).writer).poll_write(cx, buf)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut Pin::into_inner(self).writer).poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut Pin::into_inner(self).writer).poll_shutdown(cx)
    }
}
