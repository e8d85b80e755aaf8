#![allow(dead_code)]

use std::sync::Arc;
use rspdy::{Direction, HandlerResult, Request, ResponseWriter, Session};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig};

pub struct TestCert {
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
    pub cert_pem: String,
    pub key_pem: String,
}

pub fn generate_cert() -> TestCert {
    let cert = rcgen::generate_simple_self_signed(vec![String::from("localhost")]).unwrap();
    TestCert {
        cert_der: cert.serialize_der().unwrap(),
        key_der: cert.serialize_private_key_der(),
        cert_pem: cert.serialize_pem().unwrap(),
        key_pem: cert.serialize_private_key_pem(),
    }
}

impl TestCert {
    pub fn server_config(&self) -> ServerConfig {
        rspdy::negotiate::server_config(
            vec![Certificate(self.cert_der.clone())],
            PrivateKey(self.key_der.clone())).unwrap()
    }

    /// Trusts only this certificate and advertises nothing, so the crate fills in ALPN.
    pub fn client_config(&self) -> ClientConfig {
        let mut roots = RootCertStore::empty();
        roots.add(&Certificate(self.cert_der.clone())).unwrap();
        ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth()
    }
}

/// Both ends of one connection over an in-memory transport: the dialed side, which serves,
/// and the accepted side, which sends requests.
pub fn session_pair() -> (Arc<Session>, Session) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (Arc::new(Session::new(a, Direction::Dialed)), Session::new(b, Direction::Accepted))
}

pub async fn echo(mut request: Request, mut response: ResponseWriter) -> HandlerResult {
    let body = request.body.bytes().await?;
    response.insert_header("Content-Type", "application/octet-stream");
    response.write_all(&body).await?;
    response.write_all(b"-echo").await?;
    Ok(())
}
