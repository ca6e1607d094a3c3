//! Integration tests for the relay over real sockets.
//!
//! Each test starts one or more relay instances on ephemeral ports, wired
//! to a shared in-memory bus and claim store, and drives them with
//! `reqwest` (HTTP) and `tokio-tungstenite` (WebSocket) clients:
//! 1. Request/reply through a connected socket
//! 2. Deadline and validation failures on `POST /event/send`
//! 3. Identity checks and tie-break on `GET /event/ws`
//! 4. Cross-instance routing through the shared bus

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use event_relay::adapters::http::{relay_router, serve, EventAppState};
use event_relay::adapters::{
    ConnectionManager, InMemoryDistributedLock, InMemoryPubSub, InboundBridge,
};
use event_relay::application::RequestCorrelator;
use event_relay::domain::TOPIC_EVENT_REQUEST;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Bus and claim store shared by every instance of one test.
struct Cluster {
    bus: Arc<InMemoryPubSub>,
    lock: Arc<InMemoryDistributedLock>,
}

impl Cluster {
    fn new() -> Self {
        Self {
            bus: Arc::new(InMemoryPubSub::default()),
            lock: Arc::new(InMemoryDistributedLock::default()),
        }
    }

    /// Start one relay instance and wait until its subscriber loop listens.
    async fn start_instance(&self, reply_timeout: Duration) -> Instance {
        let connections = ConnectionManager::new_shared(self.bus.clone(), self.lock.clone());
        let correlator = RequestCorrelator::new_shared(self.bus.clone(), reply_timeout);
        let bridge = InboundBridge::new_shared(self.bus.clone(), connections.clone());
        let shutdown = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let subscribers_before = self.bus.subscriber_count(TOPIC_EVENT_REQUEST).await;
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move { bridge.run(shutdown).await }
        });
        tokio::spawn(serve(
            listener,
            relay_router(EventAppState::new(correlator, connections.clone())),
            shutdown.clone(),
        ));

        while self.bus.subscriber_count(TOPIC_EVENT_REQUEST).await == subscribers_before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        Instance {
            addr,
            connections,
            shutdown,
        }
    }
}

struct Instance {
    addr: SocketAddr,
    connections: Arc<ConnectionManager>,
    shutdown: CancellationToken,
}

impl Instance {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Open a socket and wait until the relay has registered it.
    async fn connect(&self, project_id: &str, connection_id: &str) -> Socket {
        let before = self.connections.connection_count();
        let socket = self.try_connect(project_id, connection_id).await.unwrap();

        while self.connections.connection_count() == before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        socket
    }

    async fn try_connect(
        &self,
        project_id: &str,
        connection_id: &str,
    ) -> Result<Socket, tokio_tungstenite::tungstenite::Error> {
        let mut request = format!("ws://{}/event/ws?project_id={}", self.addr, project_id)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert(
            "connection_id",
            HeaderValue::from_str(connection_id).unwrap(),
        );
        tokio_tungstenite::connect_async(request)
            .await
            .map(|(socket, _)| socket)
    }

    async fn send_event(&self, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url("/event/send"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Answer every event written to `socket` with `{"echo": data}`.
fn spawn_echo_client(mut socket: Socket) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(Ok(frame)) = socket.next().await {
            if let Message::Text(text) = frame {
                let mut event: Value = serde_json::from_str(&text).unwrap();
                event["data"] = json!({"echo": event["data"].clone()});
                if socket.send(Message::Text(event.to_string())).await.is_err() {
                    break;
                }
            }
        }
    })
}

/// Next text frame on `socket` as JSON, if one arrives within `wait`.
async fn next_event(socket: &mut Socket, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, socket.next())
            .await
            .ok()??
            .ok()?;
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).ok();
        }
    }
}

// =============================================================================
// POST /event/send
// =============================================================================

#[tokio::test]
async fn health_check_returns_200() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;

    let response = reqwest::get(instance.url("/")).await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn send_returns_reply_from_connected_socket() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;
    let socket = instance.connect("p1", "c1").await;
    let _echo = spawn_echo_client(socket);

    let response = instance
        .send_event(json!({"project_id": "p1", "type": "ping", "data": {"n": 1}}))
        .await;

    assert_eq!(response.status(), 200);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["project_id"], "p1");
    assert_eq!(reply["type"], "ping");
    assert_eq!(reply["data"], json!({"echo": {"n": 1}}));
    assert!(reply["id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn socket_receives_event_with_server_assigned_id() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_millis(500)).await;
    let mut socket = instance.connect("p1", "c1").await;

    let pending = tokio::spawn({
        let url = instance.url("/event/send");
        async move {
            reqwest::Client::new()
                .post(url)
                .json(&json!({"project_id": "p1", "type": "ping", "data": {}}))
                .send()
                .await
                .unwrap()
                .status()
        }
    });

    let event = next_event(&mut socket, Duration::from_secs(2))
        .await
        .expect("socket received nothing");
    assert_eq!(event["project_id"], "p1");
    assert_eq!(event["type"], "ping");
    assert!(event["id"].as_str().is_some_and(|id| !id.is_empty()));

    // Never answered, so the submitter times out.
    assert_eq!(pending.await.unwrap(), 504);
}

#[tokio::test]
async fn send_without_connection_times_out_with_504() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    let response = instance
        .send_event(json!({"project_id": "p1", "type": "ping", "data": {}}))
        .await;

    assert_eq!(response.status(), 504);
    assert!(started.elapsed() >= Duration::from_millis(300));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "DEADLINE_EXCEEDED");
}

#[tokio::test]
async fn send_without_project_id_returns_400() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;

    let response = instance
        .send_event(json!({"type": "ping", "data": {}}))
        .await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn send_with_malformed_json_returns_400() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;

    let response = reqwest::Client::new()
        .post(instance.url("/event/send"))
        .header("content-type", "application/json")
        .body("{\"project_id\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

// =============================================================================
// GET /event/ws
// =============================================================================

#[tokio::test]
async fn ws_without_connection_id_is_rejected() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;

    let result = tokio_tungstenite::connect_async(format!(
        "ws://{}/event/ws?project_id=p1",
        instance.addr
    ))
    .await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 400);
        }
        other => panic!("expected HTTP 400, got {other:?}"),
    }
    assert_eq!(instance.connections.connection_count(), 0);
}

#[tokio::test]
async fn ws_without_project_id_is_rejected() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;

    let response = reqwest::Client::new()
        .get(instance.url("/event/ws"))
        .header("connection_id", "c1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn newest_socket_of_project_receives_event() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;
    let mut older = instance.connect("p1", "c1").await;
    let newer = instance.connect("p1", "c2").await;
    let _echo = spawn_echo_client(newer);

    let response = instance
        .send_event(json!({"project_id": "p1", "type": "ping", "data": 1}))
        .await;

    assert_eq!(response.status(), 200);
    assert!(
        next_event(&mut older, Duration::from_millis(200))
            .await
            .is_none(),
        "older socket received the event"
    );
}

#[tokio::test]
async fn closed_socket_is_unregistered() {
    let cluster = Cluster::new();
    let instance = cluster.start_instance(Duration::from_secs(5)).await;
    let mut socket = instance.connect("p1", "c1").await;

    socket.close(None).await.unwrap();

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while instance.connections.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "connection was never unregistered");
}

// =============================================================================
// Multiple instances
// =============================================================================

#[tokio::test]
async fn request_on_one_instance_reaches_socket_on_another() {
    let cluster = Cluster::new();
    let ingress = cluster.start_instance(Duration::from_secs(5)).await;
    let holder = cluster.start_instance(Duration::from_secs(5)).await;
    let socket = holder.connect("p1", "c1").await;
    let _echo = spawn_echo_client(socket);

    let response = ingress
        .send_event(json!({"project_id": "p1", "type": "ping", "data": "hi"}))
        .await;

    assert_eq!(response.status(), 200);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["data"], json!({"echo": "hi"}));
    assert_eq!(ingress.connections.connection_count(), 0);
}

#[tokio::test]
async fn event_is_written_once_across_instances() {
    let cluster = Cluster::new();
    let a = cluster.start_instance(Duration::from_millis(300)).await;
    let b = cluster.start_instance(Duration::from_millis(300)).await;
    let mut on_a = a.connect("p1", "c1").await;
    let mut on_b = b.connect("p1", "c1").await;

    let response = a
        .send_event(json!({"project_id": "p1", "type": "ping", "data": {}}))
        .await;
    assert_eq!(response.status(), 504);

    let got_a = next_event(&mut on_a, Duration::from_millis(100)).await;
    let got_b = next_event(&mut on_b, Duration::from_millis(100)).await;
    assert_eq!(
        usize::from(got_a.is_some()) + usize::from(got_b.is_some()),
        1,
        "event must reach exactly one socket"
    );
}
