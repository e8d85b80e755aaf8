//! Agreeing with the peer that both ends speak this exact protocol.
//!
//! Over TLS the identifier is negotiated with ALPN during the handshake. Over a plaintext
//! transport the dialing side proposes it in-band, multistream-select style, as a
//! varint-length-prefixed line that the accepting side either echoes back or answers with
//! `na`. Either way anything other than an exact match is a hard failure; there is no
//! fallback to another protocol.

use std::io;
use std::sync::Arc;
use rustls::{Certificate, ClientConfig, PrivateKey, ServerConfig, ServerName};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::{client, server, TlsAcceptor, TlsConnector};
use tracing::{debug, warn};
use crate::error::{Error, Result};
use crate::util::BinaryData;
use crate::varint::{encode_usize, DecoderResult, U64Decoder};

/// Identifies the role-reversed protocol and its version. A forward-direction peer would
/// negotiate `spdy/3` and so never matches.
pub const PROTOCOL_ID: &str = "rspdy/3";

const NOT_AVAILABLE: &[u8] = b"na\n";

pub const MAX_PROPOSAL_SIZE: u64 = 1024;

/// ALPN candidates advertised by both sides.
pub fn alpn_protocols() -> Vec<Vec<u8>> {
    vec![PROTOCOL_ID.as_bytes().to_vec()]
}

/// Succeeds only if `negotiated` is exactly [`PROTOCOL_ID`].
pub fn check_negotiated(negotiated: Option<&[u8]>) -> Result<()> {
    match negotiated {
        Some(p) if p == PROTOCOL_ID.as_bytes() => Ok(()),
        other => Err(Error::Negotiation {
            expected: PROTOCOL_ID,
            negotiated: other.map(|p| String::from_utf8_lossy(p).into_owned()),
        }),
    }
}

/// Copies the caller's client config, advertising [`PROTOCOL_ID`] if it advertises nothing.
pub fn client_config(config: &ClientConfig) -> Arc<ClientConfig> {
    let mut config = config.clone();
    if config.alpn_protocols.is_empty() {
        config.alpn_protocols = alpn_protocols();
    }
    Arc::new(config)
}

/// Server config for the accepting side, which only ever offers [`PROTOCOL_ID`].
pub fn server_config(cert_chain: Vec<Certificate>, key: PrivateKey) -> Result<ServerConfig> {
    let mut config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    config.alpn_protocols = alpn_protocols();
    Ok(config)
}

/// Dials `addr`, performs the TLS handshake and checks the negotiated protocol.
pub async fn connect_tls<A: ToSocketAddrs>(
    addr: A,
    server_name: &str,
    config: Arc<ClientConfig>,
) -> Result<client::TlsStream<TcpStream>> {
    let name = ServerName::try_from(server_name)
        .map_err(|_| Error::InvalidServerName(String::from(server_name)))?;
    let tcp = TcpStream::connect(addr).await?;
    tcp.set_nodelay(true)?;
    let mut stream = TlsConnector::from(config).connect(name, tcp).await?;
    let negotiated = stream.get_ref().1.alpn_protocol().map(|p| p.to_vec());
    if let Err(e) = check_negotiated(negotiated.as_deref()) {
        warn!(error = %e, "closing dialed connection");
        let _ = stream.shutdown().await;
        return Err(e);
    }
    debug!(protocol = PROTOCOL_ID, "negotiated protocol on dialed connection");
    Ok(stream)
}

/// Performs the server side of the TLS handshake on an accepted connection and checks the
/// negotiated protocol. On mismatch the connection is closed here.
pub async fn accept_tls(acceptor: &TlsAcceptor, tcp: TcpStream) -> Result<server::TlsStream<TcpStream>> {
    tcp.set_nodelay(true)?;
    let mut stream = acceptor.accept(tcp).await?;
    let negotiated = stream.get_ref().1.alpn_protocol().map(|p| p.to_vec());
    if let Err(e) = check_negotiated(negotiated.as_deref()) {
        warn!(error = %e, "closing accepted connection");
        let _ = stream.shutdown().await;
        return Err(e);
    }
    debug!(protocol = PROTOCOL_ID, "negotiated protocol on accepted connection");
    Ok(stream)
}

/// Dialing side of the in-band negotiation: proposes `protocol` and requires it to be echoed.
pub async fn propose<T>(stream: &mut T, protocol: &str) -> Result<()>
    where T: AsyncRead + AsyncWrite + Unpin
{
    let proposal = proposal_line(protocol);
    write_length_prefixed_data(stream, &proposal).await?;
    stream.flush().await?;
    let answer = read_length_prefixed_data(stream).await?;
    if answer == proposal {
        debug!(protocol, "peer accepted proposal");
        Ok(())
    }
    else if answer == NOT_AVAILABLE {
        Err(Error::Negotiation { expected: PROTOCOL_ID, negotiated: None })
    }
    else {
        debug!(answer = ?BinaryData(&answer), "unexpected negotiation answer");
        Err(Error::Negotiation {
            expected: PROTOCOL_ID,
            negotiated: Some(String::from_utf8_lossy(strip_newline(&answer)).into_owned()),
        })
    }
}

/// Accepting side of the in-band negotiation: reads the peer's proposal and echoes it if it
/// is [`PROTOCOL_ID`], otherwise refuses it and fails.
pub async fn respond<T>(stream: &mut T) -> Result<()>
    where T: AsyncRead + AsyncWrite + Unpin
{
    let proposal = read_length_prefixed_data(stream).await?;
    let result = check_negotiated(Some(strip_newline(&proposal)));
    match &result {
        Ok(()) => write_length_prefixed_data(stream, &proposal).await?,
        Err(_) => write_length_prefixed_data(stream, NOT_AVAILABLE).await?,
    }
    stream.flush().await?;
    result
}

fn proposal_line(protocol: &str) -> Vec<u8> {
    let mut line = Vec::with_capacity(protocol.len() + 1);
    line.extend_from_slice(protocol.as_bytes());
    line.push(b'\n');
    line
}

fn strip_newline(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\n").unwrap_or(data)
}

async fn read_varint<T>(reader: &mut T) -> io::Result<u64>
    where T: AsyncRead + Unpin
{
    let mut decoder = U64Decoder::new();
    loop {
        match decoder.input(reader.read_u8().await?) {
            DecoderResult::Finished(value) => return Ok(value),
            DecoderResult::Overflow => return Err(io::ErrorKind::InvalidData.into()),
            DecoderResult::Pending => {}
        }
    }
}

async fn read_length_prefixed_data<T>(reader: &mut T) -> Result<Vec<u8>>
    where T: AsyncRead + Unpin
{
    let len = read_varint(reader).await?;
    if len > MAX_PROPOSAL_SIZE {
        return Err(Error::Protocol(format!("negotiation message of {} bytes", len)));
    }
    let mut data = vec![0; len as usize];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

async fn write_length_prefixed_data<T>(writer: &mut T, data: &[u8]) -> io::Result<()>
    where T: AsyncWrite + Unpin
{
    let mut len_bytes: Vec<u8> = Vec::new();
    encode_usize(data.len(), &mut len_bytes);
    writer.write_all(&len_bytes).await?;
    writer.write_all(data).await?;
    Ok(())
}
