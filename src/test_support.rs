//! Helpers for `#[cfg(test)]` modules: in-memory database, app state and
//! one-shot request plumbing.

use std::path::{Path, PathBuf};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tower::ServiceExt;

use crate::config::Config;
use crate::state::AppState;

/// Fresh SQLite database with the production schema.
pub async fn memory_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    // every pooled connection would otherwise get its own empty database
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    crate::db::init_schema(&db).await.unwrap();
    db
}

/// Directory removed again when the test drops it.
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("piggy-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}

pub fn test_config(dir: &ScratchDir) -> Config {
    let pool = dir.path().join("codes.csv");
    let state = dir.path().join("assignments.json");
    Config::try_parse_from([
        "piggy-id-server",
        "--database-url",
        "sqlite::memory:",
        "--admin-password",
        "admin-pw",
        "--superadmin-password",
        "super-pw",
        "--bot-api-key",
        "bot-key",
        "--public-base-url",
        "https://piggy.test/",
        "--rate-limit-max",
        "3",
        "--invite-pool-file",
        pool.to_str().unwrap(),
        "--invite-assignments-file",
        state.to_str().unwrap(),
    ])
    .unwrap()
}

/// App state over an in-memory database. Ownership checks and mail
/// delivery are disabled because no contract or API key is configured.
pub async fn test_state() -> (AppState, ScratchDir) {
    let dir = ScratchDir::new();
    let mut config = test_config(&dir);
    config.nft_contract_address = None;
    config.resend_api_key = None;
    (AppState::new(memory_db().await, &config), dir)
}

pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Drive one request through the router. Non-JSON bodies come back as
/// `Value::Null`.
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Like [`send`] but also returns the `Location` header.
pub async fn send_for_redirect(app: Router, req: Request<Body>) -> (StatusCode, Option<String>) {
    let resp = app.oneshot(req).await.unwrap();
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (resp.status(), location)
}
