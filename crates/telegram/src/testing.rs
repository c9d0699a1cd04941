//! In-process mock of the Telegram Bot API for tests.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{StatusCode, Uri},
        response::{IntoResponse, Response},
        routing::post,
    },
    serde::Deserialize,
    serde_json::{Value, json},
    teloxide::Bot,
    tokio::{sync::oneshot, task::JoinHandle},
};

pub const TEST_TOKEN: &str = "test-token";

/// Description Telegram sends when another instance polls with the same
/// token.
pub const CONFLICT_DESCRIPTION: &str = "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running";

#[derive(Debug, Clone)]
pub struct CapturedTelegramRequest {
    /// Lower-cased Bot API method name, e.g. `sendmessage`.
    pub method: String,
    pub body: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: i64,
    pub text: String,
    #[serde(default)]
    pub parse_mode: Option<String>,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedTelegramRequest>>>,
    /// file id -> (remote path, content)
    files: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
    send_failure: Arc<Mutex<Option<(String, u16)>>>,
    /// Seconds to ask the next `sendMessage` caller to wait.
    send_retry_after: Arc<Mutex<Option<u64>>>,
    updates: Arc<Mutex<VecDeque<Value>>>,
    poll_failure: Arc<Mutex<Option<(String, u16)>>>,
}

pub struct MockTelegramApi {
    addr: SocketAddr,
    state: MockState,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl MockTelegramApi {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler).get(file_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        Self {
            addr,
            state,
            shutdown,
            server,
        }
    }

    pub fn api_url(&self) -> reqwest::Url {
        reqwest::Url::parse(&format!("http://{}/", self.addr)).expect("parse api url")
    }

    pub fn bot(&self) -> Bot {
        Bot::new(TEST_TOKEN).set_api_url(self.api_url())
    }

    /// Make `file_id` downloadable at `path`.
    pub fn add_file(&self, file_id: &str, path: &str, content: &[u8]) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(file_id.into(), (path.into(), content.to_vec()));
    }

    /// Answer every following `sendMessage` with an API error.
    pub fn fail_send_message(&self, description: &str, error_code: u16) {
        *self.state.send_failure.lock().unwrap() = Some((description.into(), error_code));
    }

    /// Answer the next `sendMessage` with a `retry_after` rate limit.
    pub fn rate_limit_next_send(&self, retry_after_secs: u64) {
        *self.state.send_retry_after.lock().unwrap() = Some(retry_after_secs);
    }

    /// Deliver `update` on the next `getUpdates`.
    pub fn push_update(&self, update: Value) {
        self.state.updates.lock().unwrap().push_back(update);
    }

    /// Answer the next `getUpdates` with an API error.
    pub fn fail_next_poll(&self, description: &str, error_code: u16) {
        *self.state.poll_failure.lock().unwrap() = Some((description.into(), error_code));
    }

    pub fn requests(&self, method: &str) -> Vec<Value> {
        let method = method.to_ascii_lowercase();
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .map(|r| r.body.clone())
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.requests("sendMessage")
            .into_iter()
            .map(|body| serde_json::from_value(body).expect("sendMessage body"))
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        self.server.await.expect("server join");
    }
}

async fn telegram_api_handler(State(state): State<MockState>, uri: Uri, body: Bytes) -> Response {
    let method = uri
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state
        .requests
        .lock()
        .unwrap()
        .push(CapturedTelegramRequest {
            method: method.clone(),
            body: body.clone(),
        });

    match method.as_str() {
        "getupdates" => {
            if let Some((description, code)) = state.poll_failure.lock().unwrap().take() {
                return api_error(&description, code);
            }
            let queued: Vec<Value> = state.updates.lock().unwrap().drain(..).collect();
            if queued.is_empty() {
                // Stand in for a long poll that times out empty.
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            ok(Value::Array(queued))
        },
        "sendmessage" => {
            if let Some(secs) = state.send_retry_after.lock().unwrap().take() {
                return rate_limited(secs);
            }
            if let Some((description, code)) = state.send_failure.lock().unwrap().clone() {
                return api_error(&description, code);
            }
            ok(json!({
                "message_id": 1,
                "date": 0,
                "chat": { "id": body["chat_id"], "type": "private" },
                "text": body["text"],
            }))
        },
        "getme" => ok(json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Vault",
            "username": "vault_bot",
            "can_join_groups": false,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        })),
        "getfile" => {
            let file_id = body["file_id"].as_str().unwrap_or_default();
            match state.files.lock().unwrap().get(file_id) {
                Some((path, content)) => ok(json!({
                    "file_id": file_id,
                    "file_unique_id": format!("unique-{file_id}"),
                    "file_size": content.len(),
                    "file_path": path,
                })),
                None => api_error("Bad Request: invalid file_id", 400),
            }
        },
        _ => ok(json!(true)),
    }
}

async fn file_handler(State(state): State<MockState>, uri: Uri) -> Response {
    let prefix = format!("/file/bot{TEST_TOKEN}/");
    let Some(path) = uri.path().strip_prefix(&prefix) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let files = state.files.lock().unwrap();
    match files.values().find(|(p, _)| p == path) {
        Some((_, content)) => content.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn ok(result: Value) -> Response {
    Json(json!({ "ok": true, "result": result })).into_response()
}

fn rate_limited(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "ok": false,
            "description": format!("Too Many Requests: retry after {retry_after_secs}"),
            "error_code": 429,
            "parameters": { "retry_after": retry_after_secs },
        })),
    )
        .into_response()
}

fn api_error(description: &str, error_code: u16) -> Response {
    let status = StatusCode::from_u16(error_code).unwrap_or(StatusCode::BAD_REQUEST);
    (
        status,
        Json(json!({
            "ok": false,
            "description": description,
            "error_code": error_code,
        })),
    )
        .into_response()
}

/// Poll `condition` for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
