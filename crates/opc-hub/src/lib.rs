//! Local development hub: serves resource snapshots over REST and fans
//! published push messages out to every `/ws` subscriber.

use anyhow::Context;
use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use opc_core::{
    Agent, Deployment, Issue, ListResponse, LiveResource, LogEntry, PullRequest, PushMessage,
    Worktree,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_HUB_ADDR: &str = "127.0.0.1:8787";
pub const MAX_STORED_LOGS: usize = 1000;
const BROADCAST_CAPACITY: usize = 256;
const DEFAULT_LOGS_LIMIT: usize = 100;

/// Everything the REST endpoints serve. Also the fixture file format; every
/// key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub agents: Vec<Agent>,
    pub issues: Vec<Issue>,
    pub prs: Vec<PullRequest>,
    pub worktrees: Vec<Worktree>,
    pub deployments: Vec<Deployment>,
    pub logs: Vec<LogEntry>,
}

impl Snapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let mut snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        snapshot.logs.sort_by_key(|entry| entry.timestamp);
        Ok(snapshot)
    }

    /// Applies `message` to the stored records. Updates for records the hub
    /// has never seen are broadcast but not stored.
    pub fn fold(&mut self, message: &PushMessage) -> bool {
        match message {
            PushMessage::LogEntry(entry) => {
                self.logs.push(entry.clone());
                if self.logs.len() > MAX_STORED_LOGS {
                    let overflow = self.logs.len() - MAX_STORED_LOGS;
                    self.logs.drain(..overflow);
                }
                true
            }
            _ => {
                fold_into(&mut self.agents, message)
                    || fold_into(&mut self.issues, message)
                    || fold_into(&mut self.prs, message)
                    || fold_into(&mut self.worktrees, message)
                    || fold_into(&mut self.deployments, message)
            }
        }
    }

    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        let start = self.logs.len().saturating_sub(limit);
        self.logs[start..].to_vec()
    }
}

fn fold_into<R: LiveResource>(records: &mut [R], message: &PushMessage) -> bool {
    let Some((key, patch)) = R::patch_from(message) else {
        return false;
    };
    match records.iter_mut().find(|record| record.key() == key) {
        Some(record) => {
            *record = record.apply_patch(&patch);
            true
        }
        None => false,
    }
}

pub struct HubState {
    snapshot: RwLock<Snapshot>,
    events: broadcast::Sender<String>,
    next_conn: AtomicU64,
}

impl HubState {
    pub fn new(snapshot: Snapshot) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            snapshot: RwLock::new(snapshot),
            events,
            next_conn: AtomicU64::new(1),
        }
    }

    fn next_conn_id(&self) -> String {
        let id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        format!("conn-{id}")
    }

    /// Folds `message` into the snapshot and broadcasts it. Returns the number
    /// of subscribers it reached.
    pub async fn publish(&self, message: &PushMessage) -> anyhow::Result<usize> {
        let text = message.encode()?;
        let stored = self.snapshot.write().await.fold(message);
        let delivered = self.events.send(text).unwrap_or(0);
        info!(
            event = "event_published",
            kind = %message.kind(),
            stored,
            delivered
        );
        Ok(delivered)
    }

    async fn handle_socket(
        self: Arc<Self>,
        socket: WebSocket,
        remote: SocketAddr,
        mut events: broadcast::Receiver<String>,
    ) {
        let conn_id = self.next_conn_id();
        let (mut ws_sender, mut ws_receiver) = socket.split();
        info!(event = "client_connected", conn_id = %conn_id, remote = %remote);

        loop {
            tokio::select! {
                outbound = events.recv() => match outbound {
                    Ok(text) => {
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(event = "client_lagged", conn_id = %conn_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                inbound = ws_receiver.next() => {
                    let msg = match inbound {
                        Some(Ok(msg)) => msg,
                        Some(Err(err)) => {
                            warn!(event = "read_error", conn_id = %conn_id, error = %err);
                            break;
                        }
                        None => break,
                    };
                    match msg {
                        Message::Text(text) => match PushMessage::parse(&text) {
                            Ok(message) => {
                                if let Err(err) = self.publish(&message).await {
                                    warn!(event = "message_invalid", conn_id = %conn_id, error = %err);
                                }
                            }
                            Err(err) => {
                                warn!(event = "message_invalid", conn_id = %conn_id, error = %err);
                            }
                        },
                        Message::Close(_) => {
                            info!(event = "client_close", conn_id = %conn_id);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        info!(event = "client_disconnected", conn_id = %conn_id);
    }
}

pub fn router(hub: Arc<HubState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ws", get(ws_handler))
        .route("/api/agents", get(list_agents))
        .route("/api/issues", get(list_issues))
        .route("/api/prs", get(list_prs))
        .route("/api/worktrees", get(list_worktrees))
        .route("/api/deployments", get(list_deployments))
        .route("/api/logs", get(list_logs))
        .route("/api/events", post(publish_event))
        .with_state(hub)
}

pub async fn serve<F>(listener: TcpListener, hub: Arc<HubState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router(hub).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<HubState>>,
) -> impl IntoResponse {
    if !addr.ip().is_loopback() {
        return StatusCode::FORBIDDEN.into_response();
    }
    // Subscribe before the upgrade completes so nothing published after the
    // client sees the handshake is missed.
    let events = hub.events.subscribe();
    ws.on_upgrade(move |socket| async move {
        hub.handle_socket(socket, addr, events).await;
    })
}

async fn list_agents(State(hub): State<Arc<HubState>>) -> Json<ListResponse<Agent>> {
    Json(ListResponse::new(hub.snapshot.read().await.agents.clone()))
}

async fn list_issues(State(hub): State<Arc<HubState>>) -> Json<ListResponse<Issue>> {
    Json(ListResponse::new(hub.snapshot.read().await.issues.clone()))
}

async fn list_prs(State(hub): State<Arc<HubState>>) -> Json<ListResponse<PullRequest>> {
    Json(ListResponse::new(hub.snapshot.read().await.prs.clone()))
}

async fn list_worktrees(State(hub): State<Arc<HubState>>) -> Json<ListResponse<Worktree>> {
    Json(ListResponse::new(hub.snapshot.read().await.worktrees.clone()))
}

async fn list_deployments(State(hub): State<Arc<HubState>>) -> Json<ListResponse<Deployment>> {
    Json(ListResponse::new(hub.snapshot.read().await.deployments.clone()))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn list_logs(
    State(hub): State<Arc<HubState>>,
    Query(query): Query<LogsQuery>,
) -> Json<ListResponse<LogEntry>> {
    let snapshot = hub.snapshot.read().await;
    let items = snapshot.recent_logs(query.limit.unwrap_or(DEFAULT_LOGS_LIMIT));
    Json(ListResponse {
        items,
        total: snapshot.logs.len() as u64,
    })
}

async fn publish_event(State(hub): State<Arc<HubState>>, body: String) -> impl IntoResponse {
    let message = match PushMessage::parse(&body) {
        Ok(message) => message,
        Err(err) => {
            debug!(event = "publish_rejected", error = %err);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            );
        }
    };
    match hub.publish(&message).await {
        Ok(delivered) => (
            StatusCode::ACCEPTED,
            Json(json!({ "delivered": delivered })),
        ),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opc_core::{AgentStatus, DeploymentStatus, LogLevel};

    fn snapshot() -> Snapshot {
        serde_json::from_str(
            r#"{
                "agents": [{"id": "agent-1", "name": "builder", "status": "idle"}],
                "deployments": [{
                    "id": "dep-1", "environment": "staging", "status": "in_progress",
                    "version": "1.4.0",
                    "created_at": "2026-03-01T09:00:00Z", "updated_at": "2026-03-01T09:00:00Z"
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn fold_patches_known_records_only() {
        let mut snapshot = snapshot();
        let update = PushMessage::parse(
            r#"{"type":"deployment_update","deployment_id":"dep-1","status":"success","timestamp":"2026-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(snapshot.fold(&update));
        assert_eq!(snapshot.deployments[0].status, DeploymentStatus::Success);
        assert_eq!(snapshot.deployments[0].version, "1.4.0");

        let unknown = PushMessage::parse(
            r#"{"type":"agent_started","agent_id":"agent-9","task":"lint"}"#,
        )
        .unwrap();
        assert!(!snapshot.fold(&unknown));
        assert_eq!(snapshot.agents.len(), 1);
        assert_eq!(snapshot.agents[0].status, AgentStatus::Idle);
    }

    #[test]
    fn logs_are_bounded_and_served_newest_window() {
        let mut snapshot = Snapshot::default();
        for n in 0..(MAX_STORED_LOGS + 5) {
            let msg = PushMessage::LogEntry(LogEntry {
                id: Some(n.to_string()),
                timestamp: "2026-03-01T10:00:00Z".parse().unwrap(),
                level: LogLevel::Info,
                source: None,
                message: format!("line {n}"),
            });
            snapshot.fold(&msg);
        }
        assert_eq!(snapshot.logs.len(), MAX_STORED_LOGS);
        assert_eq!(snapshot.logs[0].id.as_deref(), Some("5"));
        let recent = snapshot.recent_logs(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].message, format!("line {}", MAX_STORED_LOGS + 4));
    }

    #[test]
    fn fixture_file_keys_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(
            &path,
            r#"{"logs":[
                {"timestamp":"2026-03-01T10:00:02Z","message":"b"},
                {"timestamp":"2026-03-01T10:00:01Z","message":"a"}
            ]}"#,
        )
        .unwrap();
        let snapshot = Snapshot::load(&path).unwrap();
        assert!(snapshot.issues.is_empty());
        assert_eq!(snapshot.logs[0].message, "a");

        assert!(Snapshot::load(&dir.path().join("missing.json")).is_err());
    }
}
