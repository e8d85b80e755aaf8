//! Multiplexed request/response exchanges over a single encrypted connection, with the request
//! direction reversed: the endpoint that dials the connection serves requests, and the endpoint
//! that accepts it sends them.
//!
//! A typical deployment has a node behind NAT dial out to a public host, which then issues
//! requests back to that node over the connection:
//!
//! ```no_run
//! # async fn example(client_config: rustls::ClientConfig) -> rspdy::Result<()> {
//! use rspdy::{HandlerResult, Listener, Request, RequestHead, ResponseWriter};
//!
//! async fn hello(_request: Request, mut response: ResponseWriter) -> HandlerResult {
//!     response.write_all(b"hello").await?;
//!     Ok(())
//! }
//!
//! // On the public host
//! let listener = Listener::bind("0.0.0.0:8443", "cert.pem", "key.pem").await?;
//! tokio::spawn(async move {
//!     let session = listener.accept().await?;
//!     let mut response = session.request(RequestHead::get("/"), "").await?;
//!     println!("{:?}", response.body.bytes().await?);
//!     rspdy::Result::Ok(())
//! });
//!
//! // On the node behind NAT
//! rspdy::dial_and_serve("public.example:8443", "public.example", &client_config, hello).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod message;
pub mod mux;
pub mod negotiate;
pub mod session;
pub mod util;
pub mod varint;

pub use config::MuxConfig;
pub use dispatch::{Handler, HandlerError, HandlerResult, PendingRequest, ResponseWriter};
pub use error::{Error, Result};
pub use listener::{dial_and_serve, dial_and_serve_plaintext, serve_conn, Listener};
pub use message::{Body, Headers, Request, RequestHead, Response, ResponseHead};
pub use negotiate::PROTOCOL_ID;
pub use session::{Direction, Role, Session};
