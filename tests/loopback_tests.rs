//! Live loopback tests: a local WebSocket server that rebroadcasts every
//! text frame to all connected clients, the way the room server's group
//! fan-out echoes a client's own messages back to it.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use room_sync::{Channel, ReconnectPolicy, RoomSession, SessionConfig, SessionStatus};

/// Spawn a broadcast echo server; returns its `host:port`.
async fn spawn_room_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, _) = broadcast::channel::<String>(64);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();
            let mut rx = tx.subscribe();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut sink, mut stream) = ws.split();
                loop {
                    tokio::select! {
                        msg = stream.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = tx.send(text);
                            }
                            Some(Ok(_)) => {}
                            _ => return,
                        },
                        relayed = rx.recv() => match relayed {
                            Ok(text) => {
                                if sink.send(Message::Text(text)).await.is_err() {
                                    return;
                                }
                            }
                            Err(_) => return,
                        },
                    }
                }
            });
        }
    });

    format!("127.0.0.1:{}", addr.port())
}

fn config(host: &str, channel: Channel) -> SessionConfig {
    SessionConfig {
        room_id: "42".to_string(),
        username: "alice".to_string(),
        csrf_token: "tok".to_string(),
        host: host.to_string(),
        secure: false,
        channel,
    }
}

/// Poll `check` until it passes or the deadline expires.
async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    panic!("condition not reached within deadline");
}

// ---------------------------------------------------------------------------
// Chat echo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sent_message_comes_back_rendered() {
    let host = spawn_room_server().await;
    let mut session = RoomSession::new(config(&host, Channel::Chat)).unwrap();
    session.connect().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Open);

    session.input_mut().set("  hello  ");
    session.send_message().unwrap();
    assert_eq!(session.input_mut().value(), "");

    let transcript = session.transcript();
    wait_for(|| transcript.lock().unwrap().len() == 1).await;

    let guard = transcript.lock().unwrap();
    assert_eq!(guard.entries()[0].username, "alice");
    assert_eq!(guard.entries()[0].body, "hello");
    assert_eq!(guard.entries()[0].timestamp_label, "just now");
}

#[tokio::test]
async fn test_garbage_frame_does_not_break_the_connection() {
    let host = spawn_room_server().await;
    let mut session = RoomSession::new(config(&host, Channel::Chat)).unwrap();
    session.connect().await.unwrap();

    // A second, raw client injects a non-JSON frame into the room.
    let url = format!("ws://{}/ws/room/42/", host);
    let (mut raw, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    raw.send(Message::Text("definitely not json".to_string()))
        .await
        .unwrap();
    raw.send(Message::Text(
        r#"{"message":"after garbage","username":"bob"}"#.to_string(),
    ))
    .await
    .unwrap();

    let transcript = session.transcript();
    wait_for(|| transcript.lock().unwrap().len() == 1).await;
    assert_eq!(transcript.lock().unwrap().entries()[0].body, "after garbage");
}

// ---------------------------------------------------------------------------
// Code sync between two sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_code_change_propagates_to_peer_editor() {
    let host = spawn_room_server().await;

    let mut writer = RoomSession::new(config(&host, Channel::CodeSync)).unwrap();
    writer.connect().await.unwrap();

    // Pre-load the peer's editor before it connects; changes made before
    // the session subscribes are not mirrored.
    let mut reader = RoomSession::new(config(&host, Channel::CodeSync)).unwrap();
    let reader_editor = reader.editor().unwrap();
    reader_editor.lock().unwrap().set_value("something else");
    reader.connect().await.unwrap();

    // A local edit on the writer side: set_value fires the change event,
    // the session mirrors the full snapshot.
    let writer_editor = writer.editor().unwrap();
    writer_editor.lock().unwrap().set_value("fn main() {}\n");

    wait_for(|| reader_editor.lock().unwrap().get_value() == "fn main() {}\n").await;

    // The writer's own echo must not have disturbed its editor.
    assert_eq!(writer_editor.lock().unwrap().get_value(), "fn main() {}\n");

    writer.disconnect();
    reader.disconnect();
}

#[tokio::test]
async fn test_explicit_send_code_change_reaches_peer() {
    let host = spawn_room_server().await;

    let mut writer = RoomSession::new(config(&host, Channel::CodeSync)).unwrap();
    writer.connect().await.unwrap();
    let mut reader = RoomSession::new(config(&host, Channel::CodeSync)).unwrap();
    reader.connect().await.unwrap();

    writer.send_code_change("x = 1").unwrap();

    let reader_editor = reader.editor().unwrap();
    wait_for(|| reader_editor.lock().unwrap().get_value() == "x = 1").await;
}

// ---------------------------------------------------------------------------
// Mid-session reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mid_session_drop_reconnects_and_keeps_flowing() {
    // A server that drops its first client right after the handshake, then
    // serves the redial: greets it and echoes every frame.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"message":"welcome back","username":"server"}"#.to_string(),
        ))
        .await
        .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if ws.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
        }
    });

    let mut session = RoomSession::new(config(&host, Channel::Chat))
        .unwrap()
        .with_policy(ReconnectPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        });
    session.connect().await.unwrap();

    // The server's greeting only arrives once the session has noticed the
    // drop and redialed.
    let transcript = session.transcript();
    wait_for(|| transcript.lock().unwrap().len() == 1).await;
    assert_eq!(transcript.lock().unwrap().entries()[0].body, "welcome back");

    // The re-established connection carries traffic both ways.
    session.input_mut().set("after the drop");
    session.send_message().unwrap();
    wait_for(|| transcript.lock().unwrap().len() == 2).await;
    assert_eq!(transcript.lock().unwrap().entries()[1].body, "after the drop");
    assert_eq!(session.status(), SessionStatus::Open);
}

// ---------------------------------------------------------------------------
// Reconnect exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_to_dead_server_exhausts_retries() {
    // Grab a free port and release it so nothing is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    drop(listener);

    let mut session = RoomSession::new(config(&host, Channel::Chat))
        .unwrap()
        .with_policy(ReconnectPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        });

    match session.connect().await {
        Err(room_sync::Error::RetriesExhausted { attempts }) => assert_eq!(attempts, 2),
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }

    // Still no connection, so a real submit reports it.
    session.input_mut().set("hi");
    assert!(matches!(
        session.send_message(),
        Err(room_sync::Error::NotConnected)
    ));
}
