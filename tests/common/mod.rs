//! Shared helpers for integration tests: a scripted WebSocket upstream.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use extension_bridge::SessionSettings;

/// What the upstream does once a client subscribes.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Frames sent after the first client message.
    pub frames: Vec<String>,
    /// Close the socket after the frames are sent.
    pub close_after: bool,
}

#[derive(Default)]
struct Recorder {
    script: Script,
    received: Mutex<Vec<String>>,
    connections: AtomicUsize,
    disconnects: AtomicUsize,
}

/// A running scripted upstream.
#[derive(Clone)]
pub struct Upstream {
    pub url: String,
    recorder: Arc<Recorder>,
}

impl Upstream {
    /// Messages received from clients, in order.
    pub fn received(&self) -> Vec<String> {
        self.recorder.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.recorder.connections.load(Ordering::SeqCst)
    }

    /// Connections that ended because the client closed or went away.
    pub fn disconnects(&self) -> usize {
        self.recorder.disconnects.load(Ordering::SeqCst)
    }
}

/// Start an upstream on an ephemeral port.
pub async fn spawn_upstream(script: Script) -> Upstream {
    let recorder = Arc::new(Recorder {
        script,
        ..Recorder::default()
    });

    let app = Router::new()
        .route("/ws", get(upgrade))
        .with_state(Arc::clone(&recorder));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        url: format!("ws://{}/ws", addr),
        recorder,
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(recorder): State<Arc<Recorder>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, recorder))
}

async fn serve_socket(mut socket: WebSocket, recorder: Arc<Recorder>) {
    recorder.connections.fetch_add(1, Ordering::SeqCst);

    match socket.recv().await {
        Some(Ok(Message::Text(text))) => {
            recorder.received.lock().unwrap().push(text.as_str().to_owned());
        }
        _ => return,
    }

    for frame in &recorder.script.frames {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }

    if recorder.script.close_after {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                recorder.received.lock().unwrap().push(text.as_str().to_owned());
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    recorder.disconnects.fetch_add(1, Ordering::SeqCst);
}

/// Short timings so liveness behavior is observable in real time.
pub fn fast_settings(keepalive_timeout: Duration) -> SessionSettings {
    SessionSettings {
        keepalive_timeout,
        check_interval: Duration::from_millis(20),
        poll_interval: Duration::from_millis(20),
        close_grace: Duration::from_millis(200),
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
