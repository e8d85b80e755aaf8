//! Error type shared by every layer of the crate.

use std::io;
use thiserror::Error;
use crate::session::Role;

#[derive(Debug, Error)]
pub enum Error {
    /// Dial, accept or transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    #[error("PEM error: {0}")]
    Pem(String),

    /// The peer did not agree on the one protocol identifier we speak.
    #[error("protocol negotiation failed: expected {expected:?}, negotiated {negotiated:?}")]
    Negotiation {
        expected: &'static str,
        negotiated: Option<String>,
    },

    /// The framing state can no longer be trusted; fatal to the connection.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("stream reset")]
    StreamReset,

    #[error("session closed")]
    SessionClosed,

    #[error("{operation} is not permitted on a session with role {role:?}")]
    WrongRole {
        operation: &'static str,
        role: Role,
    },

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl Error {
    /// Wraps the error in an `io::Error` for the stream handles' `AsyncRead`/`AsyncWrite`
    /// impls, keeping it recoverable through [`Error::from_io`].
    pub fn into_io(self) -> io::Error {
        let kind = match &self {
            Error::Io(e) => return io::Error::new(e.kind(), e.to_string()),
            Error::StreamReset => io::ErrorKind::ConnectionReset,
            Error::SessionClosed => io::ErrorKind::ConnectionAborted,
            Error::Protocol(_) | Error::MalformedMessage(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self)
    }

    /// Recovers a crate error previously wrapped by [`Error::into_io`].
    pub fn from_io(e: io::Error) -> Error {
        if e.get_ref().map(|inner| inner.is::<Error>()).unwrap_or(false) {
            match e.into_inner().map(|inner| inner.downcast::<Error>()) {
                Some(Ok(inner)) => *inner,
                Some(Err(other)) => Error::Io(io::Error::new(io::ErrorKind::Other, other)),
                None => Error::SessionClosed,
            }
        }
        else {
            Error::Io(e)
        }
    }

    /// Produces an equivalent error for another waiter on the same failed connection.
    pub(crate) fn duplicate(&self) -> Error {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::Tls(e) => Error::Tls(e.clone()),
            Error::InvalidServerName(s) => Error::InvalidServerName(s.clone()),
            Error::Pem(s) => Error::Pem(s.clone()),
            Error::Negotiation { expected, negotiated } => Error::Negotiation {
                expected,
                negotiated: negotiated.clone(),
            },
            Error::Protocol(s) => Error::Protocol(s.clone()),
            Error::StreamReset => Error::StreamReset,
            Error::SessionClosed => Error::SessionClosed,
            Error::WrongRole { operation, role } => Error::WrongRole {
                operation,
                role: *role,
            },
            Error::MalformedMessage(s) => Error::MalformedMessage(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;
    use std::io;

    #[test]
    fn io_wrapping_recovers_crate_error() {
        let e = Error::StreamReset.into_io();
        assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
        assert!(matches!(Error::from_io(e), Error::StreamReset));
    }

    #[test]
    fn plain_io_error_stays_io() {
        let e = io::Error::from(io::ErrorKind::UnexpectedEof);
        match Error::from_io(e) {
            Error::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
    }
}
