//! End-to-end subscriber flows over a real WebSocket.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use thermo_core::{LinkState, StatusMailbox, SystemClock};
use thermo_server::{start, MemorySink, ServerConfig, ServerHandle, SessionTiming};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Bridge {
    handle: ServerHandle,
    mailbox: Arc<StatusMailbox>,
    sink: Arc<MemorySink>,
    _link: watch::Sender<LinkState>,
    _static: tempfile::TempDir,
}

async fn start_bridge() -> Bridge {
    let static_dir = tempfile::tempdir().unwrap();
    let mailbox = Arc::new(StatusMailbox::new());
    let sink = Arc::new(MemorySink::new());
    let (link, link_rx) = watch::channel(LinkState::Open);

    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        static_dir: static_dir.path().to_path_buf(),
        timing: SessionTiming {
            heartbeat: Duration::from_millis(100),
            ping: Duration::from_secs(30),
        },
        status_interval: Duration::from_millis(100),
        max_send_queue: 64,
        client_timeout: Duration::from_secs(90),
    };
    let handle = start(
        config,
        Arc::clone(&mailbox),
        link_rx,
        sink.clone(),
        Arc::new(SystemClock),
    )
    .await
    .unwrap();

    Bridge {
        handle,
        mailbox,
        sink,
        _link: link,
        _static: static_dir,
    }
}

async fn connect(bridge: &Bridge) -> Ws {
    let url = format!("ws://127.0.0.1:{}/ws", bridge.handle.port);
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Next JSON event with the given name, skipping everything else.
async fn next_event(ws: &mut Ws, name: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let msg = ws.next().await.expect("socket closed").unwrap();
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if value["event"] == name {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {name} event"))
}

fn letter(ch: char) -> Message {
    Message::text(format!(r#"{{"event":"client_data","data":{{"letter":"{ch}"}}}}"#))
}

#[tokio::test]
async fn status_reaches_subscriber_and_clears_mailbox() {
    let bridge = start_bridge().await;
    let mut ws = connect(&bridge).await;
    let registry = Arc::clone(&bridge.handle.registry);
    wait_for("registration", || registry.count() == 1).await;

    bridge.mailbox.set("T=24.1");
    let event = next_event(&mut ws, "statusData").await;
    assert_eq!(event["data"]["statusData"], "T=24.1");
    assert!(bridge.mailbox.is_empty());

    bridge.handle.shutdown();
}

#[tokio::test]
async fn both_subscribers_get_the_same_reading() {
    let bridge = start_bridge().await;
    let mut first = connect(&bridge).await;
    let mut second = connect(&bridge).await;
    let registry = Arc::clone(&bridge.handle.registry);
    wait_for("registration", || registry.count() == 2).await;

    bridge.mailbox.set("T=88.8");
    let a = next_event(&mut first, "statusData").await;
    let b = next_event(&mut second, "statusData").await;
    assert_eq!(a["data"]["statusData"], "T=88.8");
    assert_eq!(b["data"]["statusData"], "T=88.8");

    bridge.handle.shutdown();
}

#[tokio::test]
async fn heartbeat_dates_increase() {
    let bridge = start_bridge().await;
    let mut ws = connect(&bridge).await;

    let first = next_event(&mut ws, "date").await;
    let second = next_event(&mut ws, "date").await;
    let parse = |v: &serde_json::Value| -> DateTime<Utc> {
        v["data"]["date"].as_str().unwrap().parse().unwrap()
    };
    assert!(parse(&first) < parse(&second));

    bridge.handle.shutdown();
}

#[tokio::test]
async fn keystrokes_reach_sink_in_order() {
    let bridge = start_bridge().await;
    let mut typist = connect(&bridge).await;
    let mut other = connect(&bridge).await;

    for ch in ['a', 'b', 'c'] {
        typist.send(letter(ch)).await.unwrap();
    }
    for ch in ['x', 'y', 'z'] {
        other.send(letter(ch)).await.unwrap();
    }

    let sink = Arc::clone(&bridge.sink);
    wait_for("six characters", || sink.contents().chars().count() == 6).await;

    let written = sink.contents();
    let from_typist: String = written.chars().filter(|c| "abc".contains(*c)).collect();
    let from_other: String = written.chars().filter(|c| "xyz".contains(*c)).collect();
    assert_eq!(from_typist, "abc");
    assert_eq!(from_other, "xyz");

    bridge.handle.shutdown();
}

#[tokio::test]
async fn malformed_input_is_dropped() {
    let bridge = start_bridge().await;
    let mut ws = connect(&bridge).await;

    ws.send(Message::text(r#"{"event":"client_data","data":{}}"#)).await.unwrap();
    ws.send(Message::text(r#"{"event":"client_data","data":{"letter":"ok"}}"#)).await.unwrap();
    ws.send(letter('q')).await.unwrap();

    let sink = Arc::clone(&bridge.sink);
    wait_for("one character", || !sink.contents().is_empty()).await;
    assert_eq!(sink.contents(), "q");

    bridge.handle.shutdown();
}

#[tokio::test]
async fn disconnect_unregisters_subscriber() {
    let bridge = start_bridge().await;
    let mut ws = connect(&bridge).await;
    let registry = Arc::clone(&bridge.handle.registry);
    wait_for("registration", || registry.count() == 1).await;

    ws.close(None).await.unwrap();
    wait_for("deregistration", || registry.count() == 0).await;

    bridge.mailbox.set("T=1.0");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(bridge.mailbox.peek().as_deref(), Some("T=1.0"));

    bridge.handle.shutdown();
}
