use opc_client::{ApiBase, ApiClient, ClientConfig, Environment, PushClient, PushConfig, PushEvent};
use opc_core::{DeploymentStatus, Overlay, PushMessage, UpdateOrdering};
use opc_hub::{serve, HubState, Snapshot};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use url::Url;

const FIXTURE: &str = r#"{
    "deployments": [{
        "id": "dep-7", "environment": "production", "status": "in_progress",
        "version": "2.1.0",
        "created_at": "2026-03-01T09:00:00Z", "updated_at": "2026-03-01T09:00:00Z"
    }],
    "issues": [{
        "number": 3, "title": "Release checklist", "state": "open", "author": "kai",
        "created_at": "2026-03-01T09:00:00Z", "updated_at": "2026-03-01T09:00:00Z"
    }]
}"#;

struct RunningHub {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for RunningHub {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn start_hub() -> RunningHub {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.json");
    std::fs::write(&path, FIXTURE).unwrap();
    let hub = Arc::new(HubState::new(Snapshot::load(&path).unwrap()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = serve(listener, hub, async {
            let _ = stopped.await;
        })
        .await;
    });
    RunningHub {
        addr,
        stop: Some(stop),
    }
}

fn api_client(addr: SocketAddr) -> ApiClient {
    ApiClient::new(&ClientConfig {
        environment: Environment::Development,
        api_base: ApiBase::Absolute(Url::parse(&format!("http://{addr}/api")).unwrap()),
        push_url: None,
        reconnect: false,
        reconnect_delay: Duration::from_millis(100),
        http_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn push_client(addr: SocketAddr) -> (PushClient, mpsc::Receiver<PushEvent>) {
    PushClient::new(PushConfig {
        url: Url::parse(&format!("ws://{addr}/ws")).unwrap(),
        reconnect: false,
        reconnect_delay: Duration::from_millis(100),
    })
}

async fn next_message(rx: &mut mpsc::Receiver<PushEvent>) -> PushMessage {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for push event")
            .expect("event channel closed");
        if let PushEvent::Message(message) = event {
            return message;
        }
    }
}

async fn wait_connected(rx: &mut mpsc::Receiver<PushEvent>) {
    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for connect")
        .expect("event channel closed");
    assert_eq!(event, PushEvent::Connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn posted_event_reaches_subscribers_and_snapshot() {
    let hub = start_hub().await;
    let api = api_client(hub.addr);
    let (mut push, mut events) = push_client(hub.addr);

    let base = api.fetch_deployments().await.unwrap();
    assert_eq!(base.total, 1);
    assert_eq!(base.items[0].status, DeploymentStatus::InProgress);

    push.connect();
    wait_connected(&mut events).await;

    let frame = r#"{"type":"deployment_update","deployment_id":"dep-7","status":"success","health":"healthy","timestamp":"2026-03-01T10:00:00Z"}"#;
    let response = reqwest::Client::new()
        .post(format!("http://{}/api/events", hub.addr))
        .body(frame)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    let message = next_message(&mut events).await;
    let mut overlay = Overlay::new(UpdateOrdering::Timestamp);
    overlay.ingest(&message);
    let merged = overlay.merge_all(&base.items);
    assert_eq!(merged[0].status, DeploymentStatus::Success);
    assert_eq!(merged[0].version, "2.1.0");

    let refreshed = api.fetch_deployments().await.unwrap();
    assert_eq!(refreshed.items[0], merged[0]);

    push.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_sent_by_one_client_fan_out_to_others() {
    let hub = start_hub().await;
    let (mut sender, mut sender_events) = push_client(hub.addr);
    let (mut listener, mut listener_events) = push_client(hub.addr);

    sender.connect();
    listener.connect();
    wait_connected(&mut sender_events).await;
    wait_connected(&mut listener_events).await;

    let update = PushMessage::parse(
        r#"{"type":"issue_update","issue_number":3,"state":"closed","assignee":"kai"}"#,
    )
    .unwrap();
    assert!(sender.send_message(&update));
    assert_eq!(next_message(&mut listener_events).await, update);
    assert_eq!(listener.last_message(), Some(update));

    let issues = api_client(hub.addr).fetch_issues().await.unwrap();
    assert_eq!(issues.items[0].assignee.as_deref(), Some("kai"));

    sender.disconnect().await;
    listener.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejects_malformed_events() {
    let hub = start_hub().await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{}/api/events", hub.addr))
        .body(r#"{"type":"mystery"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let health = http
        .get(format!("http://{}/health", hub.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");

    let logs = api_client(hub.addr).fetch_logs(10).await.unwrap();
    assert!(logs.items.is_empty());
}
