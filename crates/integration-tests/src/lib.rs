//! In-process HTTP stub for exercising the reqwest adapter end to end:
//! a minimal axum app answering the auth and posts endpoints, recording
//! the Authorization header of every feed request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub struct StubState {
    /// Returned verbatim by `POST /auth`, whatever its shape.
    pub login_body: Value,
    /// The only token `auth_me` and `posts` accept.
    pub valid_token: String,
    pub me_body: Value,
    pub posts: Value,
    /// Bearer token seen on each `GET /posts`, `None` when absent.
    pub seen_authorization: Vec<Option<String>>,
}

impl StubState {
    pub fn new(login_body: Value, valid_token: &str) -> SharedStub {
        Arc::new(Mutex::new(Self {
            login_body,
            valid_token: valid_token.to_string(),
            me_body: json!({}),
            posts: json!([]),
            seen_authorization: Vec::new(),
        }))
    }
}

pub type SharedStub = Arc<Mutex<StubState>>;

fn lock(stub: &SharedStub) -> MutexGuard<'_, StubState> {
    stub.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn login(State(stub): State<SharedStub>, Json(_body): Json<Value>) -> Json<Value> {
    Json(lock(&stub).login_body.clone())
}

async fn auth_me(State(stub): State<SharedStub>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let state = lock(&stub);
    if bearer(&headers).as_deref() == Some(state.valid_token.as_str()) {
        (StatusCode::OK, Json(state.me_body.clone()))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "jwt expired"})),
        )
    }
}

async fn list_posts(
    State(stub): State<SharedStub>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let mut state = lock(&stub);
    let auth = bearer(&headers);
    state.seen_authorization.push(auth.clone());
    if auth.as_deref() == Some(state.valid_token.as_str()) {
        (StatusCode::OK, Json(state.posts.clone()))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "jwt expired"})),
        )
    }
}

/// Binds the stub on an ephemeral port and returns its base url.
pub async fn serve_stub(stub: SharedStub) -> String {
    let app = Router::new()
        .route("/auth", post(login))
        .route("/auth_me", get(auth_me))
        .route("/posts", get(list_posts))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    format!("http://{addr}")
}
