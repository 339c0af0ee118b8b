use futures_util::{SinkExt, StreamExt};
use opc_client::{ConnectionState, PushClient, PushConfig, PushEvent};
use opc_core::PushMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const DEPLOY_OK: &str =
    r#"{"type":"deployment_update","deployment_id":"dep-1","status":"success","timestamp":"2026-03-01T10:00:00Z"}"#;

#[derive(Clone, Default)]
struct Behavior {
    frames: Vec<String>,
    close_first: bool,
}

struct TestServer {
    url: Url,
    accepts: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<String>,
}

impl TestServer {
    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

async fn spawn_server(behavior: Behavior) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let (received_tx, received) = mpsc::unbounded_channel();
    let counter = Arc::clone(&accepts);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let nth = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let behavior = behavior.clone();
            let received_tx = received_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                for frame in &behavior.frames {
                    if ws.send(Message::Text(frame.clone())).await.is_err() {
                        return;
                    }
                }
                if behavior.close_first && nth == 1 {
                    let _ = ws.close(None).await;
                    return;
                }
                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        let _ = received_tx.send(text);
                    }
                }
            });
        }
    });

    TestServer {
        url: Url::parse(&format!("ws://{addr}/ws")).unwrap(),
        accepts,
        received,
    }
}

fn config(url: &Url, delay_ms: u64) -> PushConfig {
    PushConfig {
        url: url.clone(),
        reconnect: true,
        reconnect_delay: Duration::from_millis(delay_ms),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<PushEvent>) -> PushEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for push event")
        .expect("event channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_connect_opens_a_single_socket() {
    let server = spawn_server(Behavior::default()).await;
    let (mut client, mut events) = PushClient::new(config(&server.url, 100));

    client.connect();
    client.connect();
    client.connect();
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    client.connect();

    sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepts(), 1);
    assert!(events.try_recv().is_err());
    assert!(client.is_connected());

    client.disconnect().await;
    assert_eq!(next_event(&mut events).await, PushEvent::Disconnected);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_after_server_close() {
    let server = spawn_server(Behavior {
        close_first: true,
        ..Behavior::default()
    })
    .await;
    let (mut client, mut events) = PushClient::new(config(&server.url, 100));
    let mut state = client.watch_state();

    client.connect();
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    assert_eq!(next_event(&mut events).await, PushEvent::Disconnected);
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    assert_eq!(server.accepts(), 2);

    timeout(Duration::from_secs(1), state.wait_for(|s| s.is_connected()))
        .await
        .unwrap()
        .unwrap();
    client.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_cancels_pending_reconnect() {
    let server = spawn_server(Behavior {
        close_first: true,
        ..Behavior::default()
    })
    .await;
    let (mut client, mut events) = PushClient::new(config(&server.url, 300));

    client.connect();
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    assert_eq!(next_event(&mut events).await, PushEvent::Disconnected);
    client.disconnect().await;

    sleep(Duration::from_millis(600)).await;
    assert_eq!(server.accepts(), 1);
    assert!(!client.is_connected());
    assert!(events.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frames_are_dropped() {
    let server = spawn_server(Behavior {
        frames: vec![
            DEPLOY_OK.to_string(),
            "{not json".to_string(),
            r#"{"type":"mystery","id":1}"#.to_string(),
            r#"{"deployment_id":"dep-2","status":"failed"}"#.to_string(),
        ],
        close_first: false,
    })
    .await;
    let (mut client, mut events) = PushClient::new(config(&server.url, 100));
    let expected = PushMessage::parse(DEPLOY_OK).unwrap();

    client.connect();
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        PushEvent::Message(expected.clone())
    );

    sleep(Duration::from_millis(300)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(client.last_message(), Some(expected));
    assert!(client.is_connected());

    client.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_only_while_connected() {
    let mut server = spawn_server(Behavior::default()).await;
    let (mut client, mut events) = PushClient::new(config(&server.url, 100));
    let message = PushMessage::parse(
        r#"{"type":"agent_progress","agent_id":"agent-1","progress":55.0}"#,
    )
    .unwrap();

    assert!(!client.send_message(&message));

    client.connect();
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    assert!(client.send_message(&message));

    let received = timeout(Duration::from_secs(5), server.received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(PushMessage::parse(&received).unwrap(), message);

    client.disconnect().await;
    assert!(!client.send_message(&message));
    assert!(server.received.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_connect_reports_error_without_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    let (mut client, mut events) = PushClient::new(PushConfig {
        reconnect: false,
        ..config(&url, 50)
    });

    client.connect();
    assert!(matches!(next_event(&mut events).await, PushEvent::Error(_)));

    sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());
    assert!(!client.is_connected());
    client.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_completes_when_events_are_not_drained() {
    let frames: Vec<String> = (0..400)
        .map(|n| {
            format!(r#"{{"type":"agent_progress","agent_id":"agent-{n}","progress":50.0}}"#)
        })
        .collect();
    let last = PushMessage::parse(frames.last().unwrap()).unwrap();
    let server = spawn_server(Behavior {
        frames,
        close_first: false,
    })
    .await;
    let (mut client, mut events) = PushClient::new(config(&server.url, 100));
    let mut last_message = client.watch_last_message();

    client.connect();
    assert_eq!(next_event(&mut events).await, PushEvent::Connected);
    timeout(
        Duration::from_secs(5),
        last_message.wait_for(|message| message.as_ref() == Some(&last)),
    )
    .await
    .expect("all frames should be read")
    .unwrap();

    timeout(Duration::from_secs(3), client.disconnect())
        .await
        .expect("disconnect hung while the event channel was full");
    assert!(!client.is_connected());
}
