//! End-to-end: a real HTTP upstream on a local socket, the reqwest connector,
//! the lifecycle and a subscriber queue.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use lib_relay::{HttpConnector, RelayLifecycle, RelayOptions, RelayState};

const EVENTS: &str = "event: vehicle_update\ndata: {\"id\":\"123\"}\n\n: keepalive\n\nevent: multi\ndata: a\ndata: b\n\n";

fn read_request(stream: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&request).to_lowercase()
}

/// Rejects the first connection with 503, then streams `EVENTS` on the second
/// and holds it open until `release` fires.
fn spawn_upstream(
    listener: TcpListener,
    requests: mpsc::Sender<String>,
    release: mpsc::Receiver<()>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            requests.send(read_request(&mut stream)).unwrap();
            stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
        }

        if let Ok((mut stream, _)) = listener.accept() {
            requests.send(read_request(&mut stream)).unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n")
                .unwrap();
            stream.write_all(EVENTS.as_bytes()).unwrap();
            stream.flush().unwrap();
            let _ = release.recv();
        }
    })
}

#[tokio::test]
async fn relays_events_after_a_rejected_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener.local_addr().unwrap().port();
    let url = format!("http://127.0.0.1:{}/stream", port);

    let (req_tx, req_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let handle = spawn_upstream(listener, req_tx, release_rx);

    let options = RelayOptions::default()
        .with_retry_delay(Duration::from_millis(50))
        .with_shutdown_grace(Duration::from_secs(2))
        .with_signal_handling(false);
    let relay = RelayLifecycle::new(HttpConnector::new(), options);
    let mut rx = relay.add_client("sse-1");

    relay.ensure_started(&url, "secret").await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first event in time")
        .unwrap();
    assert_eq!(&*first, "event: vehicle_update\ndata: {\"id\":\"123\"}\n\n");
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("second event in time")
        .unwrap();
    assert_eq!(&*second, "event: multi\ndata: a\ndata: b\n\n");

    assert_eq!(relay.state(), RelayState::Streaming);
    assert_eq!(relay.attempts(), 2);
    assert_eq!(relay.stats().broadcasts, 2);

    let requests: Vec<String> = req_rx.try_iter().collect();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert!(request.starts_with("get /stream http/1.1"));
        assert!(request.contains("x-api-key: secret"));
        assert!(request.contains("accept: text/event-stream"));
    }

    // The upstream is still open; shutdown must not wait for it.
    assert!(relay.shutdown().await);
    assert_eq!(relay.state(), RelayState::Cancelled);
    assert_eq!(rx.recv().await, None);

    release_tx.send(()).unwrap();
    handle.join().unwrap();
}

#[tokio::test]
async fn blank_credential_never_reaches_the_network() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/stream", listener.local_addr().unwrap());
    listener.set_nonblocking(true).unwrap();

    let relay = RelayLifecycle::new(
        HttpConnector::new(),
        RelayOptions::default().with_signal_handling(false),
    );
    let err = relay.ensure_started(&url, "").await.unwrap_err();
    assert!(err.is_fatal());
    assert!(!relay.is_started());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(listener.accept().is_err(), "no connection may be attempted");
}
