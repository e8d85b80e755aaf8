mod common;

use std::sync::Arc;
use std::time::Duration;
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use rspdy::mux::{StreamId, StreamState};
use rspdy::{
    Error,
    Handler,
    HandlerResult,
    Listener,
    Request,
    RequestHead,
    ResponseWriter,
    Role,
};
use common::{echo, generate_cert, session_pair};

const WAIT: Duration = Duration::from_secs(10);

/// Echoes like [`echo`] and reports the stream's state on the serving side once the response
/// is complete.
struct RecordingEcho {
    states: mpsc::UnboundedSender<(StreamId, StreamState)>,
}

impl Handler for RecordingEcho {
    fn handle(&self, mut request: Request, mut response: ResponseWriter) -> BoxFuture<'static, HandlerResult> {
        let states = self.states.clone();
        Box::pin(async move {
            let body = request.body.bytes().await?;
            response.write_all(&body).await?;
            response.write_all(b"-echo").await?;
            response.finish().await?;
            states.send((request.body.stream_id(), request.body.stream_state()))?;
            Ok(())
        })
    }
}

#[tokio::test]
async fn echo_over_tls_closes_both_ends() {
    let cert = generate_cert();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::new(tcp, cert.server_config());
    let addr = listener.local_addr().unwrap();

    let (states_tx, mut states_rx) = mpsc::unbounded_channel();
    let client_config = cert.client_config();
    let dialer = tokio::spawn(async move {
        let handler = RecordingEcho { states: states_tx };
        rspdy::dial_and_serve(addr, "localhost", &client_config, handler).await
    });

    let session = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    assert_eq!(session.role(), Role::Originator);

    let mut response = session.request(RequestHead::post("/echo"), "ping").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.head.reason, "OK");
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"ping-echo");
    let stream_id = response.body.stream_id();
    // Opened by the accepting side, so even.
    assert!(!stream_id.is_odd());
    assert_eq!(response.body.stream_state(), StreamState::Closed);

    let (served_id, served_state) = timeout(WAIT, states_rx.recv()).await.unwrap().unwrap();
    assert_eq!(served_id, stream_id);
    assert_eq!(served_state, StreamState::Closed);

    drop(response);
    assert_eq!(session.stream_count(), 0);

    session.close();
    let served = timeout(WAIT, dialer).await.unwrap().unwrap();
    assert!(served.is_ok() || matches!(served, Err(Error::Io(_))));
}

#[tokio::test]
async fn dialer_serves_and_acceptor_requests() {
    let (dialed, accepted) = session_pair();
    assert_eq!(dialed.role(), Role::Acceptor);
    assert_eq!(accepted.role(), Role::Originator);

    let server = dialed.clone();
    tokio::spawn(async move { server.serve(echo).await });

    let mut response = accepted.request(RequestHead::get("/"), "hello").await.unwrap();
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"hello-echo");
    assert_eq!(response.headers().get("content-type"), Some("application/octet-stream"));

    assert!(matches!(accepted.serve(echo).await,
        Err(Error::WrongRole { operation: "serve", role: Role::Originator })));
    assert!(matches!(dialed.request(RequestHead::get("/"), "").await,
        Err(Error::WrongRole { operation: "request", role: Role::Acceptor })));
    assert!(matches!(dialed.start_request(RequestHead::get("/")).await,
        Err(Error::WrongRole { .. })));
}

async fn delayed_echo(mut request: Request, mut response: ResponseWriter) -> HandlerResult {
    let delay: u64 = request.path().trim_start_matches('/').parse()?;
    tokio::time::sleep(Duration::from_millis(delay)).await;
    let body = request.body.bytes().await?;
    response.write_all(&body).await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_streams_stay_independent() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(delayed_echo).await });

    let accepted = Arc::new(accepted);
    let mut rng = StdRng::seed_from_u64(50);
    let mut tasks = Vec::new();
    for i in 0..50 {
        let len = rng.gen_range(0..40_000);
        let body: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        // Later requests finish first.
        let delay = (50 - i) * 4;
        let session = accepted.clone();
        tasks.push(tokio::spawn(async move {
            let mut response = session.request(RequestHead::post(format!("/{}", delay)), body.clone()).await?;
            let echoed = response.body.bytes().await?;
            assert_eq!(response.status(), 200);
            assert_eq!(&echoed[..], &body[..]);
            rspdy::Result::Ok(response.body.stream_id())
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(timeout(WAIT, task).await.unwrap().unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 50);
    assert!(ids.iter().all(|id| !id.is_odd()));
}

#[tokio::test]
async fn large_body_flows_through_window() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(echo).await });

    let mut rng = StdRng::seed_from_u64(1);
    let body: Vec<u8> = (0..1024 * 1024).map(|_| rng.gen()).collect();

    let mut pending = accepted.start_request(RequestHead::post("/upload")).await.unwrap();
    for chunk in body.chunks(100_000) {
        timeout(WAIT, pending.write_all(chunk)).await.unwrap().unwrap();
    }
    let mut response = timeout(WAIT, pending.finish()).await.unwrap().unwrap();
    let mut echoed = Vec::new();
    timeout(WAIT, response.body.read_to_end(&mut echoed)).await.unwrap().unwrap();
    assert_eq!(echoed.len(), body.len() + 5);
    assert_eq!(&echoed[..body.len()], &body[..]);
    assert_eq!(&echoed[body.len()..], b"-echo");
}

async fn answer_early(_request: Request, mut response: ResponseWriter) -> HandlerResult {
    response.write_all(b"done").await?;
    Ok(())
}

#[tokio::test]
async fn response_before_request_body_finishes() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(answer_early).await });

    let mut pending = accepted.start_request(RequestHead::post("/upload")).await.unwrap();
    pending.write_all(b"some data").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // The handler has returned by now; late body data is discarded by the serving side.
    pending.write_all(b"more data").await.unwrap();
    let mut response = timeout(WAIT, pending.finish()).await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"done");
    assert_eq!(response.body.stream_state(), StreamState::Closed);
    drop(response);
    assert_eq!(accepted.stream_count(), 0);

    for _ in 0..100 {
        if dialed.stream_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(dialed.stream_count(), 0);
}

#[tokio::test]
async fn ignored_large_body_still_gets_response() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(answer_early).await });

    let body = vec![0u8; 1024 * 1024];
    let mut response = timeout(WAIT, accepted.request(RequestHead::post("/upload"), body))
        .await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(&response.body.bytes().await.unwrap()[..], b"done");
    assert!(!accepted.is_closed());
}

async fn flaky(request: Request, response: ResponseWriter) -> HandlerResult {
    let path = request.path().to_string();
    match path.as_str() {
        "/fail" => Err("out of widgets".into()),
        "/panic" => panic!("handler blew up"),
        _ => echo(request, response).await,
    }
}

#[tokio::test]
async fn handler_failure_becomes_server_error() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(flaky).await });

    let accepted = Arc::new(accepted);
    let session = accepted.clone();
    let healthy = tokio::spawn(async move {
        let mut response = session.request(RequestHead::get("/ok"), "fine").await?;
        response.body.bytes().await
    });

    let mut failed = accepted.request(RequestHead::get("/fail"), "").await.unwrap();
    assert_eq!(failed.status(), 500);
    assert_eq!(failed.head.reason, "Internal Server Error");
    assert_eq!(&failed.body.bytes().await.unwrap()[..], b"out of widgets");

    let mut panicked = accepted.request(RequestHead::get("/panic"), "").await.unwrap();
    assert_eq!(panicked.status(), 500);
    assert_eq!(&panicked.body.bytes().await.unwrap()[..], b"handler panicked");

    let body = timeout(WAIT, healthy).await.unwrap().unwrap().unwrap();
    assert_eq!(&body[..], b"fine-echo");
    assert!(!accepted.is_closed());
    assert!(!dialed.is_closed());
}

async fn fail_midway(_request: Request, mut response: ResponseWriter) -> HandlerResult {
    response.write_all(b"partial").await?;
    Err("gave up".into())
}

#[tokio::test]
async fn failure_after_head_resets_stream() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(fail_midway).await });

    // The head may or may not arrive before the reset does.
    match accepted.request(RequestHead::get("/"), "").await {
        Ok(mut response) => {
            assert_eq!(response.status(), 200);
            assert!(matches!(response.body.bytes().await, Err(Error::StreamReset)));
        }
        Err(e) => assert!(matches!(e, Error::StreamReset | Error::MalformedMessage(_))),
    }
}

#[tokio::test]
async fn malformed_request_gets_bad_request() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let dialed = Arc::new(rspdy::Session::new(a, rspdy::Direction::Dialed));
    let server = dialed.clone();
    tokio::spawn(async move { server.serve(echo).await });

    // Drive the accepting end at the stream level to send a head the dispatcher can't parse.
    let mux = rspdy::mux::Mux::new(b, rspdy::mux::Side::Listener, rspdy::MuxConfig::default());
    let mut stream = mux.open_stream().unwrap();
    stream.write_all(b"NOT-A-REQUEST-LINE\r\n\r\n").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = String::new();
    timeout(WAIT, stream.read_to_string(&mut reply)).await.unwrap().unwrap();
    assert!(reply.starts_with("400 Bad Request\r\n"), "{:?}", reply);
}

#[tokio::test]
async fn closing_session_fails_outstanding_requests() {
    let (dialed, accepted) = session_pair();
    let server = dialed.clone();
    let serving = tokio::spawn(async move { server.serve(delayed_echo).await });

    let accepted = Arc::new(accepted);
    let session = accepted.clone();
    let slow = tokio::spawn(async move {
        session.request(RequestHead::get("/60000"), "").await.map(|_| ())
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    accepted.close();

    let result = timeout(WAIT, slow).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::SessionClosed)));
    // The serving side sees the connection go away, cleanly or not.
    let _ = timeout(WAIT, serving).await.unwrap().unwrap();
    assert!(dialed.is_closed());
    assert!(matches!(accepted.request(RequestHead::get("/"), "").await, Err(Error::SessionClosed)));
}
