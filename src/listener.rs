//! Establishing connections: the accepting side yields originator sessions, the dialing side
//! serves requests over the connection it dialed.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use rustls::{ClientConfig, ServerConfig};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};
use crate::config::MuxConfig;
use crate::crypto::pem;
use crate::dispatch::Handler;
use crate::error::Result;
use crate::negotiate::{self, PROTOCOL_ID};
use crate::session::{Direction, Session};
use crate::util::io::AsyncStream;

enum Security {
    Tls(TlsAcceptor),
    Plaintext,
}

/// Accepts transport connections and turns each into an originator-role [`Session`].
pub struct Listener {
    listener: TcpListener,
    security: Security,
    config: MuxConfig,
}

impl Listener {
    /// Binds `addr` and serves TLS with the certificate chain and private key in the given PEM
    /// files.
    pub async fn bind<A, C, K>(addr: A, cert_file: C, key_file: K) -> Result<Listener>
        where A: ToSocketAddrs, C: AsRef<Path>, K: AsRef<Path>
    {
        let certs = pem::load_certificates(cert_file)?;
        let key = pem::load_private_key(key_file)?;
        let server_config = negotiate::server_config(certs, key)?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Listener::new(listener, server_config))
    }

    /// Wraps an already bound listener. If `server_config` advertises no ALPN protocols it is
    /// made to advertise [`PROTOCOL_ID`].
    pub fn new(listener: TcpListener, mut server_config: ServerConfig) -> Listener {
        if server_config.alpn_protocols.is_empty() {
            server_config.alpn_protocols = negotiate::alpn_protocols();
        }
        Listener {
            listener,
            security: Security::Tls(TlsAcceptor::from(Arc::new(server_config))),
            config: MuxConfig::default(),
        }
    }

    /// Accepts unencrypted connections, agreeing on the protocol in-band. For loopback and
    /// testing.
    pub fn plaintext(listener: TcpListener) -> Listener {
        Listener {
            listener,
            security: Security::Plaintext,
            config: MuxConfig::default(),
        }
    }

    pub fn with_mux_config(mut self, config: MuxConfig) -> Listener {
        self.config = config;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the next connection and negotiates the protocol on it. A connection whose
    /// peer does not speak [`PROTOCOL_ID`] is closed and reported as an error; the listener
    /// itself stays usable.
    pub async fn accept(&self) -> Result<Session> {
        let (tcp, peer) = self.listener.accept().await?;
        debug!(%peer, "accepted connection");
        let session = match &self.security {
            Security::Tls(acceptor) => {
                let stream = negotiate::accept_tls(acceptor, tcp).await?;
                Session::with_config(stream, Direction::Accepted, self.config.clone())
            }
            Security::Plaintext => {
                let mut tcp = tcp;
                tcp.set_nodelay(true)?;
                negotiate::respond(&mut tcp).await?;
                Session::with_config(tcp, Direction::Accepted, self.config.clone())
            }
        };
        info!(%peer, role = ?session.role(), "session started");
        Ok(session)
    }
}

/// Dials `addr` over TLS, negotiates the protocol and serves requests from the accepting side
/// with `handler` until the connection ends.
pub async fn dial_and_serve<A, H>(
    addr: A,
    server_name: &str,
    config: &ClientConfig,
    handler: H,
) -> Result<()>
    where A: ToSocketAddrs, H: Handler
{
    let stream = negotiate::connect_tls(addr, server_name, negotiate::client_config(config)).await?;
    info!(server_name, "dialed connection");
    serve_conn(stream, handler).await
}

/// Plaintext counterpart of [`dial_and_serve`], for use with [`Listener::plaintext`].
pub async fn dial_and_serve_plaintext<A, H>(addr: A, handler: H) -> Result<()>
    where A: ToSocketAddrs, H: Handler
{
    let mut tcp = TcpStream::connect(addr).await?;
    tcp.set_nodelay(true)?;
    negotiate::propose(&mut tcp, PROTOCOL_ID).await?;
    info!("dialed connection");
    serve_conn(tcp, handler).await
}

/// Serves requests over a connection this side dialed and has already negotiated.
pub async fn serve_conn<T, H>(transport: T, handler: H) -> Result<()>
    where T: AsyncStream + 'static, H: Handler
{
    let session = Session::new(transport, Direction::Dialed);
    info!(role = ?session.role(), "session started");
    let result = session.serve(handler).await;
    info!(streams = session.stream_count(), "session ended");
    result
}
