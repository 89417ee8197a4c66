// tests/common/mod.rs
// In-process admin API: REST endpoints plus an SSE stream endpoint

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct ServerState {
    /// Raw `data:` payloads sent by the stream endpoint, in order
    pub stream_payloads: Mutex<Vec<String>>,
    /// When set, `POST /chat` answers with this status
    pub chat_status: Mutex<Option<u16>>,
    /// When set, `POST /chat` answers with this body instead of a stream url
    pub chat_body: Mutex<Option<Value>>,
    pub chat_requests: Mutex<Vec<Value>>,
    pub conversation_queries: Mutex<Vec<HashMap<String, String>>>,
    pub authorization: Mutex<Vec<Option<String>>>,
}

impl ServerState {
    pub fn stream(&self, payloads: &[&str]) {
        *self.stream_payloads.lock().unwrap() = payloads.iter().map(|p| p.to_string()).collect();
    }

    pub fn fail_chat_with(&self, status: u16) {
        *self.chat_status.lock().unwrap() = Some(status);
    }

    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.authorization.lock().unwrap().push(value);
    }
}

pub struct TestServer {
    /// Base url including the `/api` prefix
    pub base_url: String,
    pub state: Arc<ServerState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_server() -> TestServer {
    let state = Arc::new(ServerState::default());

    let app = Router::new()
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{id}/messages", get(list_messages))
        .route("/api/chat", post(chat))
        .route("/api/stream/{id}", get(stream))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://127.0.0.1:{}/api", addr.port()),
        state,
        handle,
    }
}

async fn list_conversations(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record_auth(&headers);
    state.conversation_queries.lock().unwrap().push(params);
    Json(json!({
        "data": [
            { "id": 42, "topic": "Revenue trends", "lastMessageAt": "2024-05-01T10:00:03Z" },
            { "id": 7, "topic": null }
        ]
    }))
}

async fn list_messages(Path(id): Path<i64>) -> Json<Value> {
    Json(json!({
        "data": [
            {
                "id": id * 10 + 1,
                "user": "How many bookings in May?",
                "assistant": "There were 31 bookings in May.",
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:02Z"
            },
            {
                "id": id * 10 + 2,
                "user": "Chart it",
                "assistant": "",
                "created_at": "2024-05-01T10:01:00Z",
                "url": "https://charts.example.com/may.png"
            }
        ]
    }))
}

async fn chat(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record_auth(&headers);
    state.chat_requests.lock().unwrap().push(body);

    if let Some(status) = *state.chat_status.lock().unwrap() {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (code, "rejected").into_response();
    }
    if let Some(body) = state.chat_body.lock().unwrap().clone() {
        return Json(body).into_response();
    }
    Json(json!({ "streamUrl": "stream/1", "conversationId": 42 })).into_response()
}

async fn stream(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let payloads = state.stream_payloads.lock().unwrap().clone();
    let events = async_stream::stream! {
        for data in payloads {
            yield Ok(Event::default().data(data));
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default())
}
