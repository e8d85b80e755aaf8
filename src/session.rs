//! One role-fixed multiplexing context per transport connection.
//!
//! Roles are reversed relative to who dialed: the side that dialed the connection serves
//! requests, and the side that accepted it sends them.

use std::sync::Arc;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use crate::config::MuxConfig;
use crate::dispatch::{self, Handler, PendingRequest};
use crate::error::{Error, Result};
use crate::message::{RequestHead, Response};
use crate::mux::{Mux, Side};
use crate::util::io::AsyncStream;

/// How this process came to hold the transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Dialed,
    Accepted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Accepts streams and answers the requests on them.
    Acceptor,
    /// Opens streams and sends requests on them.
    Originator,
}

impl From<Direction> for Role {
    fn from(direction: Direction) -> Role {
        match direction {
            Direction::Dialed => Role::Acceptor,
            Direction::Accepted => Role::Originator,
        }
    }
}

pub struct Session {
    role: Role,
    mux: Mux,
}

impl Session {
    /// Takes over a transport connection whose protocol has already been negotiated.
    /// Must be called from within a tokio runtime.
    pub fn new<T>(transport: T, direction: Direction) -> Session
        where T: AsyncStream + 'static
    {
        Self::with_config(transport, direction, MuxConfig::default())
    }

    pub fn with_config<T>(transport: T, direction: Direction, config: MuxConfig) -> Session
        where T: AsyncStream + 'static
    {
        let side = match direction {
            Direction::Dialed => Side::Dialer,
            Direction::Accepted => Side::Listener,
        };
        let role = Role::from(direction);
        debug!(?direction, ?role, "session established");
        Session {
            role,
            mux: Mux::new(transport, side, config),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn require(&self, role: Role, operation: &'static str) -> Result<()> {
        if self.role == role {
            Ok(())
        }
        else {
            Err(Error::WrongRole { operation, role: self.role })
        }
    }

    /// Answers requests from the peer until the connection ends. Each request is handled in
    /// a task of its own. Returns `Ok` if the connection closed cleanly.
    pub async fn serve<H: Handler>(&self, handler: H) -> Result<()> {
        self.require(Role::Acceptor, "serve")?;
        let handler = Arc::new(handler);
        info!("serving requests");
        while let Some(stream) = self.mux.accept_stream().await? {
            tokio::spawn(dispatch::serve_stream(stream, handler.clone()));
        }
        info!("connection closed");
        Ok(())
    }

    /// Sends a request with a complete body and waits for the response head. The response
    /// body is streamed.
    pub async fn request<B: Into<Bytes>>(&self, head: RequestHead, body: B) -> Result<Response> {
        let mut pending = self.start_request(head).await?;
        let body = body.into();
        if let Err(e) = pending.write_all(&body).await {
            pending.reset();
            return Err(Error::from_io(e));
        }
        pending.finish().await
    }

    /// Opens a request whose body is written incrementally.
    pub async fn start_request(&self, head: RequestHead) -> Result<PendingRequest> {
        self.require(Role::Originator, "request")?;
        let stream = self.mux.open_stream()?;
        PendingRequest::start(stream, &head).await
    }

    /// Closes the connection. Every live stream fails with an end-of-session error.
    pub fn close(&self) {
        self.mux.close();
    }

    pub fn is_closed(&self) -> bool {
        self.mux.is_closed()
    }

    pub fn stream_count(&self) -> usize {
        self.mux.stream_count()
    }
}
