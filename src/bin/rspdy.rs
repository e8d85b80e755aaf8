use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use rspdy::crypto::pem;
use rspdy::{HandlerResult, Listener, Request, RequestHead, ResponseWriter, Session};

/// Treats any server certificate as valid.
/// NOTE, such verification is vulnerable to MITM attacks, but convenient for testing.
struct SkipServerVerification;

impl SkipServerVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl rustls::client::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        info!(?server_name, "skipping certificate verification");
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

#[derive(Parser)]
#[command(name="rspdy")]
struct Options {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    /// Dial a listener and answer its requests
    Dial(Dial),
    /// Accept connections and send requests to whoever dials in
    Listen(Listen),
}

#[derive(Parser)]
struct Dial {
    #[arg()]
    addr: String,
    #[arg(long)]
    server_name: Option<String>,
    /// PEM file of certificates to trust
    #[arg(long)]
    ca_file: Option<PathBuf>,
    /// Accept any server certificate
    #[arg(long)]
    insecure: bool,
    /// Skip TLS and negotiate in-band
    #[arg(long)]
    plaintext: bool,
}

#[derive(Parser)]
struct Listen {
    #[arg()]
    addr: String,
    #[arg(long)]
    cert: Option<PathBuf>,
    #[arg(long)]
    key: Option<PathBuf>,
    /// Requests to send on each session
    #[arg(long, default_value_t = 1)]
    requests: usize,
    /// Skip TLS and negotiate in-band
    #[arg(long)]
    plaintext: bool,
}

async fn echo(mut request: Request, mut response: ResponseWriter) -> HandlerResult {
    let body = request.body.bytes().await?;
    info!(stream = %response.stream_id(), method = request.method(), path = request.path(),
        len = body.len(), "request");
    response.insert_header("Content-Type", "application/octet-stream");
    response.write_all(&body).await?;
    response.write_all(b"-echo").await?;
    response.finish().await?;
    Ok(())
}

fn make_client_config(dial: &Dial) -> Result<rustls::ClientConfig, Box<dyn Error>> {
    let builder = rustls::ClientConfig::builder().with_safe_defaults();
    if dial.insecure {
        return Ok(builder
            .with_custom_certificate_verifier(SkipServerVerification::new())
            .with_no_client_auth());
    }
    let ca_file = dial.ca_file.as_ref().ok_or("--ca-file is required unless --insecure is given")?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in pem::load_certificates(ca_file)? {
        roots.add(&cert)?;
    }
    Ok(builder
        .with_root_certificates(roots)
        .with_no_client_auth())
}

async fn dial(dial: Dial) -> Result<(), Box<dyn Error>> {
    if dial.plaintext {
        rspdy::dial_and_serve_plaintext(dial.addr.as_str(), echo).await?;
        return Ok(());
    }
    let config = make_client_config(&dial)?;
    let server_name = match &dial.server_name {
        Some(name) => name.clone(),
        None => dial.addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(dial.addr.as_str()).to_string(),
    };
    rspdy::dial_and_serve(dial.addr.as_str(), &server_name, &config, echo).await?;
    Ok(())
}

async fn send_requests(session: Session, count: usize) -> rspdy::Result<()> {
    for i in 0..count {
        let head = RequestHead::post(format!("/echo/{}", i));
        let mut response = session.request(head, format!("request {}", i)).await?;
        let mut body = String::new();
        response.body.read_to_string(&mut body).await.map_err(rspdy::Error::from_io)?;
        println!("{} {} {}", response.status(), response.head.reason, body);
    }
    session.close();
    Ok(())
}

async fn listen(listen: Listen) -> Result<(), Box<dyn Error>> {
    let listener = if listen.plaintext {
        Listener::plaintext(tokio::net::TcpListener::bind(listen.addr.as_str()).await?)
    }
    else {
        let cert = listen.cert.as_ref().ok_or("--cert is required unless --plaintext is given")?;
        let key = listen.key.as_ref().ok_or("--key is required unless --plaintext is given")?;
        Listener::bind(listen.addr.as_str(), cert, key).await?
    };
    info!(addr = %listener.local_addr()?, "listening");
    let requests = listen.requests;
    loop {
        match listener.accept().await {
            Ok(session) => {
                tokio::spawn(async move {
                    if let Err(e) = send_requests(session, requests).await {
                        error!(error = %e, "session failed");
                    }
                });
            }
            Err(e) => error!(error = %e, "connection rejected"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opt = Options::parse();
    match opt.subcmd {
        SubCommand::Dial(d) => dial(d).await,
        SubCommand::Listen(l) => listen(l).await,
    }
}
