// src/handlers/http.rs — Account endpoints that hand out receiver-join tokens.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    accounts::{AccountError, AccountStore},
    identity::{JwtAuthority, TokenError},
};

#[derive(Clone)]
pub struct HttpState {
    pub accounts: Arc<AccountStore>,
    pub tokens:   Arc<JwtAuthority>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest { pub name: String, pub email: String, pub password: String }

#[derive(Debug, Deserialize)]
pub struct LoginRequest { pub email: String, pub password: String }

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse { pub message: &'static str, pub user_id: String }

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token:         String,
    pub receiver_link: String,
    pub call_link:     String,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .with_state(state)
}

async fn ping_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn register_handler(
    State(state): State<HttpState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<SignupResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::malformed("Registration failed", e))?;
    let user_id = state.accounts.create(&req.name, &req.email, &req.password).await?;
    Ok(Json(SignupResponse { message: "Registered Successfully", user_id }))
}

async fn login_handler(
    State(state): State<HttpState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::malformed("Login failed", e))?;
    let handle = state.accounts.authenticate(&req.email, &req.password).await?;
    let token = state.tokens.issue(&handle)?;
    info!("[acct] '{handle}' logged in");

    Ok(Json(LoginResponse {
        token,
        receiver_link: format!("/receiver/{handle}"),
        call_link:     format!("/call/{handle}"),
    }))
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError { status: StatusCode, message: String }

impl ApiError {
    /// Body missing, not JSON, or lacking a field: always a plain 400.
    fn malformed(message: &str, rejection: JsonRejection) -> Self {
        debug!("[acct] rejected request body: {}", rejection.body_text());
        Self { status: StatusCode::BAD_REQUEST, message: message.to_owned() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: e.to_string() }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        error!("[acct] token issue failed: {e}");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: "Login failed".into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<JwtAuthority>) {
        let tokens = Arc::new(JwtAuthority::new("http-tests", 3600));
        let state = HttpState { accounts: Arc::new(AccountStore::new()), tokens: tokens.clone() };
        (router(state), tokens)
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn register_then_login_issues_token_for_handle() {
        let (app, tokens) = app();

        let (status, body) = post_json(&app, "/register",
            json!({ "name": "Bob", "email": "bob@example.com", "password": "pw" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Registered Successfully");
        let handle = body["userId"].as_str().unwrap().to_owned();

        let (status, body) = post_json(&app, "/login",
            json!({ "email": "bob@example.com", "password": "pw" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["receiverLink"], format!("/receiver/{handle}"));
        assert_eq!(body["callLink"], format!("/call/{handle}"));

        let claims = tokens.validate(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.handle, handle);
    }

    #[tokio::test]
    async fn login_failures_are_bad_requests() {
        let (app, _) = app();
        post_json(&app, "/register",
            json!({ "name": "Bob", "email": "bob@example.com", "password": "pw" })).await;

        let (status, body) = post_json(&app, "/login",
            json!({ "email": "bob@example.com", "password": "wrong" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Wrong password");

        let (status, body) = post_json(&app, "/login",
            json!({ "email": "eve@example.com", "password": "pw" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User not found");
    }

    #[tokio::test]
    async fn duplicate_email_is_refused() {
        let (app, _) = app();
        let signup = json!({ "name": "Bob", "email": "bob@example.com", "password": "pw" });
        post_json(&app, "/register", signup.clone()).await;
        let (status, body) = post_json(&app, "/register", signup).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already registered");
    }

    #[tokio::test]
    async fn incomplete_bodies_get_json_errors() {
        let (app, _) = app();

        let (status, body) = post_json(&app, "/register",
            json!({ "name": "Bob", "email": "bob@example.com" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Registration failed" }));

        let (status, body) = post_json(&app, "/login", json!({ "email": 7 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Login failed" }));

        let req = Request::post("/register").body(Body::from("not json")).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ping_pongs() {
        let (app, _) = app();
        let res = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({ "message": "pong" }));
    }
}
