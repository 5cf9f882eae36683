//! In-process storage service used by the integration tests.
//!
//! Speaks the service's envelope protocol over HTTP/1.1 and h2c, keeps one
//! storage namespace in memory and records every request it receives.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

/// One request as seen by the service
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub password: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct State {
    requests: Vec<RecordedRequest>,
    token: Option<String>,
    refresh_token: Option<String>,
    password: Option<String>,
    values: Map<String, Value>,
    backups: Vec<(String, Map<String, Value>)>,
    issued: u64,
    create_failure: Option<String>,
    raw_response: Option<(StatusCode, String)>,
    delay: Option<Duration>,
}

impl State {
    fn issue_token(&mut self) -> String {
        self.issued += 1;
        let token = format!("tok{}", self.issued);
        self.token = Some(token.clone());
        token
    }
}

fn envelope(status: StatusCode, ok: bool, description: Option<&str>, data: Value) -> (StatusCode, String) {
    let body = json!({
        "status": ok,
        "description": description,
        "data": data,
    });
    (status, body.to_string())
}

fn success(data: Value) -> (StatusCode, String) {
    envelope(StatusCode::OK, true, None, data)
}

fn failure(status: StatusCode, description: &str) -> (StatusCode, String) {
    envelope(status, false, Some(description), Value::Null)
}

/// Handle to a running mock service
#[derive(Clone)]
pub struct MockStorage {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl MockStorage {
    /// Bind to an ephemeral local port and serve until the test ends.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock service");
        let addr = listener.local_addr().expect("mock service address");
        let state = Arc::new(Mutex::new(State::default()));

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(state.clone(), req));
                    let _ = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("no request recorded")
    }

    /// Make every following `create` fail with `description`.
    pub fn fail_create(&self, description: &str) {
        self.state.lock().unwrap().create_failure = Some(description.to_string());
    }

    /// Answer the next request with a raw body instead of an envelope.
    pub fn respond_raw(&self, status: StatusCode, body: &str) {
        self.state.lock().unwrap().raw_response = Some((status, body.to_string()));
    }

    /// Delay every response.
    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn current_token(&self) -> Option<String> {
        self.state.lock().unwrap().token.clone()
    }

    pub fn stored(&self) -> Map<String, Value> {
        self.state.lock().unwrap().values.clone()
    }
}

async fn handle(
    state: Arc<Mutex<State>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let password = header("password");
    let content_type = header("content-type");
    let accept = header("accept");

    let raw = req.into_body().collect().await.map(|c| c.to_bytes()).unwrap_or_default();
    let body = if raw.is_empty() {
        None
    } else {
        serde_json::from_slice::<Value>(&raw).ok()
    };

    let delay = state.lock().unwrap().delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let (status, text) = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            password: password.clone(),
            content_type,
            accept,
            body: body.clone(),
        });
        match state.raw_response.take() {
            Some(raw) => raw,
            None => route(&mut state, &method, &path, password.as_deref(), body),
        }
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(text)))
        .unwrap())
}

fn route(
    state: &mut State,
    method: &Method,
    path: &str,
    password: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, String) {
    let segments: Vec<String> = path
        .trim_start_matches('/')
        .split('/')
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .collect();

    if method == Method::POST && segments == ["create"] {
        return create(state, body.unwrap_or(Value::Null));
    }

    let Some((token, rest)) = segments.split_first() else {
        return failure(StatusCode::NOT_FOUND, "Not found");
    };
    if state.token.as_deref() != Some(token.as_str()) {
        return failure(StatusCode::UNAUTHORIZED, "Invalid token");
    }

    let rest: Vec<&str> = rest.iter().map(String::as_str).filter(|s| !s.is_empty()).collect();
    let mutating = !(method == Method::GET || rest == ["refresh"]);
    if mutating && state.password.is_some() && state.password.as_deref() != password {
        return failure(StatusCode::FORBIDDEN, "Wrong password");
    }

    match (method.as_str(), rest.as_slice()) {
        ("POST", ["refresh"]) => {
            let sent = body
                .as_ref()
                .and_then(|b| b.get("refreshToken"))
                .and_then(Value::as_str);
            if sent.is_none() || sent != state.refresh_token.as_deref() {
                return failure(StatusCode::OK, "Invalid refresh token");
            }
            let token = state.issue_token();
            success(Value::String(token))
        }
        ("GET", ["backup", "list"]) => {
            let ids: Vec<Value> = state
                .backups
                .iter()
                .map(|(id, _)| Value::String(id.clone()))
                .collect();
            success(Value::Array(ids))
        }
        ("POST", ["backup"]) => {
            let id = format!("backup-{}", state.backups.len() + 1);
            let snapshot = state.values.clone();
            state.backups.push((id.clone(), snapshot));
            success(Value::String(id))
        }
        ("POST", ["backup", id]) => {
            match state.backups.iter().find(|(b, _)| b == id) {
                Some((_, values)) => {
                    state.values = values.clone();
                    success(Value::Object(state.values.clone()))
                }
                None => failure(StatusCode::OK, "Backup not found"),
            }
        }
        ("GET", [key]) => success(state.values.get(*key).cloned().unwrap_or(Value::Null)),
        ("POST", []) => match body {
            Some(Value::Object(data)) => {
                state.values.extend(data);
                success(Value::Object(state.values.clone()))
            }
            _ => failure(StatusCode::OK, "Data must be an object"),
        },
        ("DELETE", [key]) => {
            let existed = state.values.remove(*key).is_some();
            let description = (!existed).then_some("Key not found");
            envelope(StatusCode::OK, existed, description, Value::Null)
        }
        ("DELETE", []) => {
            state.values.clear();
            success(Value::Null)
        }
        _ => failure(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn create(state: &mut State, body: Value) -> (StatusCode, String) {
    if let Some(description) = state.create_failure.clone() {
        return failure(StatusCode::OK, &description);
    }

    let backup = body.get("backup").and_then(Value::as_str);
    state.values = match backup {
        Some(id) => match state.backups.iter().find(|(b, _)| b == id) {
            Some((_, values)) => values.clone(),
            None => return failure(StatusCode::OK, "Backup not found"),
        },
        None => Map::new(),
    };
    state.password = body
        .get("password")
        .and_then(Value::as_str)
        .map(str::to_string);

    let token = state.issue_token();
    let refresh_token = format!("ref{}", state.issued);
    state.refresh_token = Some(refresh_token.clone());

    success(json!({"token": token, "refreshToken": refresh_token}))
}
