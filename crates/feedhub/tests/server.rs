//! Integration tests for the hub: login, upgrade and the full event flow
//! over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use feedhub::prelude::*;
use feedhub::{Credentials, FeedSettings};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestHub {
    addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    running: tokio::task::JoinHandle<Result<(), HubError>>,
}

fn test_settings() -> Settings {
    Settings {
        credentials: Some(Credentials {
            username: "percy".into(),
            password: "123".into(),
        }),
        ..Settings::default()
    }
}

/// Starts a hub on a random port.
async fn start_hub(settings: Settings) -> TestHub {
    let server = HubServer::builder()
        .settings(settings)
        .bind("127.0.0.1:0".parse().unwrap())
        .build()
        .await
        .expect("server should build");

    let addr = server.local_addr();
    let registry = server.registry();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(server.run(shutdown.clone()));

    TestHub {
        addr,
        registry,
        shutdown,
        running,
    }
}

async fn login(addr: SocketAddr, username: &str, password: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/login"))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .expect("login request should complete")
}

/// Logs in with the test credentials and returns the one-time token.
async fn login_otp(addr: SocketAddr) -> String {
    let response = login(addr, "percy", "123").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("login body is JSON");
    body["otp"].as_str().expect("otp is a string").to_owned()
}

async fn connect(addr: SocketAddr, otp: &str) -> Result<ClientWs, tungstenite::Error> {
    tokio_tungstenite::connect_async(format!("ws://{addr}/ws?otp={otp}"))
        .await
        .map(|(ws, _)| ws)
}

async fn connect_logged_in(addr: SocketAddr) -> ClientWs {
    let otp = login_otp(addr).await;
    connect(addr, &otp).await.expect("upgrade should succeed")
}

/// Status code of a refused upgrade.
fn rejected_status(result: Result<ClientWs, tungstenite::Error>) -> u16 {
    match result {
        Ok(_) => panic!("upgrade should have been refused"),
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(other) => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

async fn send_event(ws: &mut ClientWs, kind: &str, payload: Value) {
    let text = json!({"type": kind, "payload": payload}).to_string();
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Waits for the next event of `kind`, skipping anything else, and returns
/// its payload.
async fn recv_event(ws: &mut ClientWs, kind: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = ws
                .next()
                .await
                .expect("connection should stay open")
                .expect("read should succeed");
            if let Message::Text(text) = msg {
                let event: Value = serde_json::from_str(text.as_str()).expect("event is JSON");
                if event["type"] == kind {
                    return event["payload"].clone();
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind} event within 5s"))
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_login_valid_credentials_returns_otp() {
    let hub = start_hub(test_settings()).await;

    let otp = login_otp(hub.addr).await;

    assert_eq!(otp.len(), 32);
}

#[tokio::test]
async fn test_login_wrong_credentials_unauthorized() {
    let hub = start_hub(test_settings()).await;

    let response = login(hub.addr, "percy", "wrong").await;

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_login_get_method_not_allowed() {
    let hub = start_hub(test_settings()).await;

    let response = reqwest::get(format!("http://{}/login", hub.addr)).await.unwrap();

    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_login_malformed_body_bad_request() {
    let hub = start_hub(test_settings()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/login", hub.addr))
        .header("content-type", "application/json")
        .body("{ nope")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_login_while_token_outstanding_unauthorized() {
    let hub = start_hub(test_settings()).await;
    login_otp(hub.addr).await;

    let response = login(hub.addr, "percy", "123").await;

    assert_eq!(response.status(), 401);
    let body = response.text().await.unwrap();
    assert!(body.contains("outstanding"), "body: {body}");
}

#[tokio::test]
async fn test_login_after_token_spent_succeeds() {
    let hub = start_hub(test_settings()).await;
    let _ws = connect_logged_in(hub.addr).await;

    let response = login(hub.addr, "percy", "123").await;

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_login_without_configured_credentials_unauthorized() {
    let hub = start_hub(Settings::default()).await;

    let response = login(hub.addr, "", "").await;

    assert_eq!(response.status(), 401);
}

// =========================================================================
// Upgrade
// =========================================================================

#[tokio::test]
async fn test_upgrade_token_is_single_use() {
    let hub = start_hub(test_settings()).await;
    let otp = login_otp(hub.addr).await;

    let first = connect(hub.addr, &otp).await;
    assert!(first.is_ok());

    let second = connect(hub.addr, &otp).await;
    assert_eq!(rejected_status(second), 401);
}

#[tokio::test]
async fn test_upgrade_without_token_unauthorized() {
    let hub = start_hub(test_settings()).await;

    let result = tokio_tungstenite::connect_async(format!("ws://{}/ws", hub.addr))
        .await
        .map(|(ws, _)| ws);

    assert_eq!(rejected_status(result), 401);
}

#[tokio::test]
async fn test_upgrade_unknown_token_unauthorized() {
    let hub = start_hub(test_settings()).await;

    let result = connect(hub.addr, "00000000000000000000000000000000").await;

    assert_eq!(rejected_status(result), 401);
}

#[tokio::test]
async fn test_upgrade_foreign_origin_forbidden() {
    let hub = start_hub(test_settings()).await;
    let otp = login_otp(hub.addr).await;
    let mut request = format!("ws://{}/ws?otp={otp}", hub.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("origin", HeaderValue::from_static("http://evil.example"));

    let result = tokio_tungstenite::connect_async(request).await.map(|(ws, _)| ws);

    assert_eq!(rejected_status(result), 403);
    // The refused request did not spend the token.
    assert!(connect(hub.addr, &otp).await.is_ok());
}

#[tokio::test]
async fn test_upgrade_registers_session() {
    let hub = start_hub(test_settings()).await;

    let _ws = connect_logged_in(hub.addr).await;

    // Registration happens on the server's upgrade task.
    tokio::time::timeout(Duration::from_secs(5), async {
        while hub.registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session registered");
    assert_eq!(hub.registry.len(), 1);
}

// =========================================================================
// Events
// =========================================================================

#[tokio::test]
async fn test_subscribe_known_feed_then_already_subscribed() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;

    send_event(&mut ws, "subscribe", json!({"currency": "Nani"})).await;
    assert_eq!(
        recv_event(&mut ws, "subscribe").await,
        json!({"currency": "Subscribed"})
    );

    send_event(&mut ws, "subscribe", json!({"currency": "Nani"})).await;
    assert_eq!(
        recv_event(&mut ws, "subscribe").await,
        json!({"currency": "Already Subscribed"})
    );
}

#[tokio::test]
async fn test_subscribe_unknown_feed_not_found() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;

    send_event(&mut ws, "subscribe", json!({"currency": "Doge"})).await;

    assert_eq!(
        recv_event(&mut ws, "subscribe").await,
        json!({"currency": "Not Found"})
    );
}

#[tokio::test]
async fn test_unsubscribe_replies_with_prior_state() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;

    send_event(&mut ws, "unsubscribe", json!({"currency": "Fun"})).await;
    assert_eq!(
        recv_event(&mut ws, "unsubscribe").await,
        json!({"currency": "Not Subscribed"})
    );

    send_event(&mut ws, "subscribe", json!({"currency": "Fun"})).await;
    recv_event(&mut ws, "subscribe").await;
    send_event(&mut ws, "unsubscribe", json!({"currency": "Fun"})).await;
    assert_eq!(
        recv_event(&mut ws, "unsubscribe").await,
        json!({"currency": "Unsubscribed"})
    );
}

#[tokio::test]
async fn test_acknowledge_replies_connection_init() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;

    send_event(&mut ws, "acknowledge", json!({})).await;

    assert_eq!(
        recv_event(&mut ws, "connection_init").await,
        json!({"acknowledge": true})
    );
}

#[tokio::test]
async fn test_send_message_reaches_every_client() {
    let hub = start_hub(test_settings()).await;
    let mut alice = connect_logged_in(hub.addr).await;
    // Tokens are per address; the first one has been spent.
    let mut bob = connect_logged_in(hub.addr).await;
    // Make sure both are registered before broadcasting.
    send_event(&mut bob, "acknowledge", json!({})).await;
    recv_event(&mut bob, "connection_init").await;

    send_event(&mut alice, "send_message", json!({"message": "hello", "from": "alice"})).await;

    for ws in [&mut alice, &mut bob] {
        let payload = recv_event(ws, "new_message").await;
        assert_eq!(payload["message"], "hello");
        assert_eq!(payload["from"], "alice");
        assert!(payload["sent"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;

    ws.send(Message::Text("definitely not json".into())).await.unwrap();
    send_event(&mut ws, "dance", json!({})).await;
    send_event(&mut ws, "acknowledge", json!({})).await;

    assert_eq!(
        recv_event(&mut ws, "connection_init").await,
        json!({"acknowledge": true})
    );
}

#[tokio::test]
async fn test_subscribed_client_receives_feed_updates() {
    let settings = Settings {
        feeds: vec![FeedSettings {
            name: "Quick".into(),
            initial_value: 100,
            decimals: 2,
            delta_min: -20,
            delta_max: 20,
            interval_ms: 50,
        }],
        ..test_settings()
    };
    let hub = start_hub(settings).await;
    let mut ws = connect_logged_in(hub.addr).await;

    send_event(&mut ws, "subscribe", json!({"currency": "Quick"})).await;
    recv_event(&mut ws, "subscribe").await;

    let update = recv_event(&mut ws, "new_message").await;
    assert_eq!(update["name"], "Quick");
    assert_eq!(update["decimal"], 2);
    assert_eq!(update["interval_in_ms"], 50);
    let value: i64 = update["value"].as_str().unwrap().parse().unwrap();
    assert!(value >= 0);
}

#[tokio::test]
async fn test_oversized_message_closes_connection() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;

    let big = json!({"type": "send_message", "payload": {"message": "x".repeat(4096), "from": "a"}});
    // The server may already be gone by the time the send completes.
    let _ = ws.send(Message::Text(big.to_string().into())).await;

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "connection should be closed");
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_shutdown_closes_sessions_and_stops() {
    let hub = start_hub(test_settings()).await;
    let mut ws = connect_logged_in(hub.addr).await;
    send_event(&mut ws, "acknowledge", json!({})).await;
    recv_event(&mut ws, "connection_init").await;

    hub.shutdown.cancel();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "client should see the connection close");

    hub.running
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    assert!(hub.registry.is_empty());
}
