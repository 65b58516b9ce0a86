//! Scripted mock TTS server for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{ws::Message, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{any, post},
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tts_client::config::{CHUNKED_PATH, STREAM_WS_PATH};
use tts_client::TtsOptions;

/// What the server sends once its trigger request has arrived.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(Value),
    Binary(Vec<u8>),
    /// Close handshake, then stop.
    Close,
    /// Drop the connection without a close handshake.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Reply after the terminal request.
    Terminal,
    /// Reply after the first request.
    FirstRequest,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub trigger: Trigger,
    pub replies: Vec<Reply>,
    pub chunked_status: StatusCode,
    pub chunked_body: Vec<u8>,
    pub chunked_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            trigger: Trigger::Terminal,
            replies: vec![Reply::Close],
            chunked_status: StatusCode::OK,
            chunked_body: Vec::new(),
            chunked_delay: None,
        }
    }
}

impl Script {
    pub fn replies(trigger: Trigger, replies: Vec<Reply>) -> Self {
        Self {
            trigger,
            replies,
            ..Self::default()
        }
    }

    pub fn chunked(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            chunked_status: status,
            chunked_body: body,
            ..Self::default()
        }
    }
}

pub fn start(segment_id: &str) -> Reply {
    Reply::Text(serde_json::json!({ "type": "start", "segment_id": segment_id }))
}

pub fn end() -> Reply {
    Reply::Text(serde_json::json!({ "type": "end" }))
}

struct MockState {
    script: Script,
    requests: Mutex<Vec<Value>>,
    chunked_requests: Mutex<Vec<Value>>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn start(script: Script) -> Self {
        let state = Arc::new(MockState {
            script,
            requests: Mutex::new(Vec::new()),
            chunked_requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(STREAM_WS_PATH, any(stream_ws))
            .route(CHUNKED_PATH, post(chunked))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn options(&self) -> TtsOptions {
        TtsOptions {
            base_url: self.base_url(),
            ..TtsOptions::default()
        }
    }

    /// Synthesis requests received over the WebSocket, in order.
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn chunked_requests(&self) -> Vec<Value> {
        self.state.chunked_requests.lock().unwrap().clone()
    }
}

/// A listener that accepts connections and never answers the handshake.
pub async fn silent_listener() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

async fn stream_ws(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> impl IntoResponse {
    ws.on_upgrade(move |mut socket| async move {
        let mut replied = false;

        while let Some(Ok(msg)) = socket.recv().await {
            let Message::Text(text) = msg else { continue };
            let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };

            let terminal = request["continue"] == Value::Bool(false);
            let count = {
                let mut requests = state.requests.lock().unwrap();
                requests.push(request);
                requests.len()
            };

            let triggered = match state.script.trigger {
                Trigger::Terminal => terminal,
                Trigger::FirstRequest => count == 1,
            };
            if replied || !triggered {
                continue;
            }
            replied = true;

            for reply in state.script.replies.clone() {
                match reply {
                    Reply::Text(value) => {
                        let _ = socket.send(Message::Text(value.to_string().into())).await;
                    }
                    Reply::Binary(data) => {
                        let _ = socket.send(Message::Binary(data.into())).await;
                    }
                    Reply::Close => {
                        let _ = socket.send(Message::Close(None)).await;
                        // Let the client finish the handshake
                        while let Some(Ok(_)) = socket.recv().await {}
                        return;
                    }
                    Reply::Drop => return,
                }
            }
        }
    })
}

async fn chunked(State(state): State<Arc<MockState>>, Json(request): Json<Value>) -> impl IntoResponse {
    state.chunked_requests.lock().unwrap().push(request);
    if let Some(delay) = state.script.chunked_delay {
        tokio::time::sleep(delay).await;
    }
    (state.script.chunked_status, state.script.chunked_body.clone())
}
