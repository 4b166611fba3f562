pub mod admin;
pub mod email;
pub mod identity;
pub mod invite;
pub mod settings;

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use subtle::ConstantTimeEq;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::invites::Tenant;
use crate::state::AppState;

const MAX_CSV_UPLOAD: usize = 10 * 1024 * 1024; // 10MB

pub fn router(state: AppState) -> Router {
    // Public invite endpoints share one per-client budget
    let invite_routes = Router::new()
        .route(
            "/api/invite-code",
            post(invite::assign_poker_code).get(invite::get_poker_code),
        )
        .route("/api/poker/invite-code", post(invite::assign_poker_file_code))
        .route("/api/superpoker/invite-code", post(invite::assign_superpoker_code))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(invite_routes)
        // Admin
        .route(
            "/api/admin/{tenant}/codes",
            get(admin::list_codes)
                .post(admin::add_code)
                .delete(admin::clear_codes),
        )
        .route(
            "/api/admin/{tenant}/codes/upload",
            post(admin::upload_codes).layer(DefaultBodyLimit::max(MAX_CSV_UPLOAD)),
        )
        .route("/api/admin/{tenant}/codes/{code}", delete(admin::delete_code))
        .route("/api/admin/{tenant}/stats", get(admin::get_stats))
        .route("/api/admin/{tenant}/usage", post(admin::record_usage))
        // Identity
        .route(
            "/api/identity",
            get(identity::get_identity).post(identity::save_identity),
        )
        .route("/api/disconnect", post(identity::disconnect))
        // Email verification
        .route("/api/email/send", post(email::send_verification))
        .route("/api/email/verify", get(email::verify_email))
        // Settings
        .route(
            "/api/settings/tournament-url",
            get(settings::get_tournament_url).put(settings::put_tournament_url),
        )
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn secret_matches(expected: Option<&str>, given: &str) -> bool {
    match expected {
        Some(expected) if !expected.is_empty() => expected.as_bytes().ct_eq(given.as_bytes()).into(),
        _ => false,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Poker admin routes accept either password; superpoker needs the superadmin one.
pub fn require_admin(state: &AppState, headers: &HeaderMap, tenant: Tenant) -> Result<(), AppError> {
    let given = header_str(headers, "x-admin-password");
    let secrets = &state.secrets;
    let superadmin = secret_matches(secrets.superadmin_password.as_deref(), given);
    let allowed = match tenant {
        Tenant::Poker => superadmin || secret_matches(secrets.admin_password.as_deref(), given),
        Tenant::Superpoker => superadmin,
    };
    if !allowed {
        tracing::warn!(tenant = %tenant, "rejected admin request");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub fn require_bot_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if !secret_matches(state.secrets.bot_api_key.as_deref(), header_str(headers, "x-api-key")) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Socket peer, or the right-most `x-forwarded-for` entry when a proxy we
/// trust appends it. Entries to its left are client supplied.
fn client_key(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = header_str(req.headers(), "x-forwarded-for")
            .rsplit(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(&req, state.trust_proxy);
    if let Err(wait) = state.invite_rate_limiter.try_acquire(&key) {
        tracing::warn!(client = %key, path = %req.uri().path(), "rate limited");
        let mut resp = AppError::RateLimited.into_response();
        resp.headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(wait.as_secs().max(1)));
        return resp;
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{send, test_state};
    use axum::body::Body;
    use axum::http::{self, Method, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn secrets_compare_exactly() {
        assert!(secret_matches(Some("hunter2"), "hunter2"));
        assert!(!secret_matches(Some("hunter2"), "hunter"));
        assert!(!secret_matches(Some(""), ""));
        assert!(!secret_matches(None, "anything"));
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(
            router(state),
            http::Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn admin_password_does_not_unlock_superpoker() {
        let (state, _dir) = test_state().await;
        let mut headers = HeaderMap::new();
        headers.insert("x-admin-password", "admin-pw".parse().unwrap());
        assert!(require_admin(&state, &headers, Tenant::Poker).is_ok());
        assert!(matches!(
            require_admin(&state, &headers, Tenant::Superpoker),
            Err(AppError::Unauthorized)
        ));

        headers.insert("x-admin-password", "super-pw".parse().unwrap());
        assert!(require_admin(&state, &headers, Tenant::Poker).is_ok());
        assert!(require_admin(&state, &headers, Tenant::Superpoker).is_ok());
    }

    fn invite_lookup(peer: [u8; 4], forwarded_for: &str) -> http::Request<Body> {
        let mut req = http::Request::builder()
            .method(Method::GET)
            .uri("/api/invite-code?token_id=1")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        req
    }

    #[tokio::test]
    async fn invite_routes_are_rate_limited_per_peer() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        // test_state allows 3 requests per window
        for _ in 0..3 {
            let (status, _) = send(app.clone(), invite_lookup([9, 9, 9, 9], "1.1.1.1")).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        let resp = app
            .clone()
            .oneshot(invite_lookup([9, 9, 9, 9], "1.1.1.1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(RETRY_AFTER));

        let (status, _) = send(app, invite_lookup([8, 8, 8, 8], "1.1.1.1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forged_forwarded_for_does_not_reset_the_budget() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        let mut limited = 0;
        for i in 0..10 {
            let (status, body) =
                send(app.clone(), invite_lookup([9, 9, 9, 9], &format!("10.0.0.{i}"))).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                assert_eq!(body["kind"], "RATE_LIMITED");
                limited += 1;
            }
        }
        assert_eq!(limited, 7);
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_the_appended_hop() {
        let (mut state, _dir) = test_state().await;
        state.trust_proxy = true;
        let app = router(state);
        // the proxy peer is shared; only the hop it appended identifies the client
        for i in 0..3 {
            let forwarded = format!("10.0.0.{i}, 203.0.113.7");
            let (status, _) = send(app.clone(), invite_lookup([127, 0, 0, 1], &forwarded)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        let (status, _) = send(
            app.clone(),
            invite_lookup([127, 0, 0, 1], "spoofed, 203.0.113.7"),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = send(app, invite_lookup([127, 0, 0, 1], "198.51.100.2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
