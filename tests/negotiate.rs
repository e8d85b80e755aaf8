mod common;

use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use rspdy::negotiate::{self, PROTOCOL_ID};
use rspdy::{Error, Listener, RequestHead, Role};
use common::{echo, generate_cert};

const WAIT: Duration = Duration::from_secs(10);

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rspdy-{}-{}", std::process::id(), name))
}

#[tokio::test]
async fn alpn_mismatch_fails_both_sides() {
    let cert = generate_cert();
    let listener = Listener::new(TcpListener::bind("127.0.0.1:0").await.unwrap(), cert.server_config());
    let addr = listener.local_addr().unwrap();

    // A forward-direction peer.
    let mut client_config = cert.client_config();
    client_config.alpn_protocols = vec![b"spdy/3".to_vec()];
    let dialed = tokio::spawn(async move {
        rspdy::dial_and_serve(addr, "localhost", &client_config, echo).await
    });

    let accepted = timeout(WAIT, listener.accept()).await.unwrap();
    assert!(accepted.is_err());
    let dialed = timeout(WAIT, dialed).await.unwrap().unwrap();
    assert!(dialed.is_err());
}

#[tokio::test]
async fn listener_survives_rejected_connection() {
    let cert = generate_cert();
    let listener = Listener::new(TcpListener::bind("127.0.0.1:0").await.unwrap(), cert.server_config());
    let addr = listener.local_addr().unwrap();

    let mut wrong_config = cert.client_config();
    wrong_config.alpn_protocols = vec![b"h2".to_vec()];
    let wrong = tokio::spawn(async move {
        negotiate::connect_tls(addr, "localhost", std::sync::Arc::new(wrong_config)).await.map(|_| ())
    });
    assert!(timeout(WAIT, listener.accept()).await.unwrap().is_err());
    assert!(timeout(WAIT, wrong).await.unwrap().unwrap().is_err());

    let client_config = cert.client_config();
    tokio::spawn(async move {
        rspdy::dial_and_serve(addr, "localhost", &client_config, echo).await
    });
    let session = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut response = session.request(RequestHead::get("/"), "again").await.unwrap();
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"again-echo");
}

#[tokio::test]
async fn plaintext_negotiation() {
    let listener = Listener::plaintext(TcpListener::bind("127.0.0.1:0").await.unwrap());
    let addr = listener.local_addr().unwrap();
    tokio::spawn(rspdy::dial_and_serve_plaintext(addr, echo));

    let session = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    assert_eq!(session.role(), Role::Originator);
    let mut response = session.request(RequestHead::post("/"), "plain").await.unwrap();
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"plain-echo");
}

#[tokio::test]
async fn plaintext_mismatch_yields_no_session() {
    let listener = Listener::plaintext(TcpListener::bind("127.0.0.1:0").await.unwrap());
    let addr = listener.local_addr().unwrap();
    let proposer = tokio::spawn(async move {
        let mut tcp = TcpStream::connect(addr).await?;
        negotiate::propose(&mut tcp, "spdy/3").await
    });

    let accepted = timeout(WAIT, listener.accept()).await.unwrap();
    assert!(matches!(accepted, Err(Error::Negotiation { expected: PROTOCOL_ID, .. })));
    let proposed = timeout(WAIT, proposer).await.unwrap().unwrap();
    assert!(matches!(proposed, Err(Error::Negotiation { negotiated: None, .. })));
}

#[tokio::test]
async fn bind_loads_pem_files() {
    let cert = generate_cert();
    let cert_file = temp_path("cert.pem");
    let key_file = temp_path("key.pem");
    std::fs::write(&cert_file, &cert.cert_pem).unwrap();
    std::fs::write(&key_file, &cert.key_pem).unwrap();

    let listener = Listener::bind("127.0.0.1:0", &cert_file, &key_file).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client_config = cert.client_config();
    tokio::spawn(async move {
        rspdy::dial_and_serve(addr, "localhost", &client_config, echo).await
    });

    let session = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut response = session.request(RequestHead::get("/pem"), "tls").await.unwrap();
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"tls-echo");

    let _ = std::fs::remove_file(&cert_file);
    let _ = std::fs::remove_file(&key_file);
}

#[tokio::test]
async fn bind_rejects_missing_key() {
    let cert = generate_cert();
    let cert_file = temp_path("only-cert.pem");
    std::fs::write(&cert_file, &cert.cert_pem).unwrap();
    let result = Listener::bind("127.0.0.1:0", &cert_file, &cert_file).await;
    assert!(matches!(result, Err(Error::Pem(_))));
    let _ = std::fs::remove_file(&cert_file);
}

#[tokio::test]
async fn invalid_server_name_is_rejected() {
    let cert = generate_cert();
    let result = rspdy::dial_and_serve("127.0.0.1:1", "not a hostname!", &cert.client_config(), echo).await;
    assert!(matches!(result, Err(Error::InvalidServerName(_))));
}
