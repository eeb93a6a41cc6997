//! Operator endpoints for the request shield.
//!
//! Mounted under `/admin/shield` outside the admission middleware, so an
//! operator can always reach them. They carry no authentication; keep the
//! gateway bound to loopback when they are enabled.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::shield::{RateLimiter, ShieldError, ShieldStats};

/// Reason recorded for blocks placed without one.
pub const MANUAL_BLOCK_REASON: &str = "Manual block";

/// Admin API errors.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The request body is not acceptable.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The shield failed internally.
    #[error(transparent)]
    Shield(#[from] ShieldError),
}

#[derive(Debug, Serialize)]
struct AdminErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Shield(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!("Admin request failed: {}", self);
        }

        let body = AdminErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Body of `POST /block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    /// Client address to block.
    pub ip: String,
    /// Block reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Block duration in milliseconds. Defaults to the DDoS block duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Response of `POST /block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    /// Blocked client address.
    pub ip: String,
    /// Recorded reason.
    pub reason: String,
    /// Block expiry.
    pub until: DateTime<Utc>,
}

/// Body of `POST /unblock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnblockRequest {
    /// Client address to unblock.
    pub ip: String,
}

/// Response of `POST /unblock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnblockResponse {
    /// Client address.
    pub ip: String,
    /// Whether an active block was lifted.
    pub unblocked: bool,
}

/// Response of `POST /clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    /// Number of client entries dropped.
    pub cleared: usize,
}

/// Build the admin router, to be nested under `/admin/shield`.
pub fn admin_router(limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/block", post(block_handler))
        .route("/unblock", post(unblock_handler))
        .route("/clear", post(clear_handler))
        .with_state(limiter)
}

async fn stats_handler(
    State(limiter): State<Arc<RateLimiter>>,
) -> Result<Json<ShieldStats>, AdminError> {
    Ok(Json(limiter.get_stats()?))
}

async fn block_handler(
    State(limiter): State<Arc<RateLimiter>>,
    Json(request): Json<BlockRequest>,
) -> Result<Json<BlockResponse>, AdminError> {
    let ip = required_ip(&request.ip)?;
    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(MANUAL_BLOCK_REASON);
    let duration = block_duration(&limiter, request.duration_ms)?;

    let block = limiter.block_ip(ip, reason, duration)?;
    Ok(Json(BlockResponse {
        ip: ip.to_string(),
        reason: block.reason,
        until: block.until,
    }))
}

async fn unblock_handler(
    State(limiter): State<Arc<RateLimiter>>,
    Json(request): Json<UnblockRequest>,
) -> Result<Json<UnblockResponse>, AdminError> {
    let ip = required_ip(&request.ip)?;
    let unblocked = limiter.unblock_ip(ip)?;
    Ok(Json(UnblockResponse {
        ip: ip.to_string(),
        unblocked,
    }))
}

async fn clear_handler(
    State(limiter): State<Arc<RateLimiter>>,
) -> Result<Json<ClearResponse>, AdminError> {
    let cleared = limiter.clear_all()?;
    Ok(Json(ClearResponse { cleared }))
}

fn block_duration(limiter: &RateLimiter, duration_ms: Option<u64>) -> Result<Duration, AdminError> {
    let Some(ms) = duration_ms else {
        return Ok(limiter.config().ddos.block_duration());
    };
    if ms == 0 {
        return Err(AdminError::InvalidRequest(
            "durationMs must be positive".to_string(),
        ));
    }

    // The expiry has to be a representable instant
    let fits = i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|delta| limiter.now().checked_add_signed(delta))
        .is_some();
    if !fits {
        return Err(AdminError::InvalidRequest(format!(
            "durationMs is out of range: {ms}"
        )));
    }
    Ok(Duration::from_millis(ms))
}

fn required_ip(ip: &str) -> Result<&str, AdminError> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(AdminError::InvalidRequest("ip is required".to_string()));
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header::CONTENT_TYPE};
    use serde_json::{Value, json};
    use tablegate_core::{ClientKey, Clock, MockClock, ShieldConfig};
    use tower::ServiceExt;

    use crate::events::SecurityEventBroadcaster;
    use crate::shield::RequestInfo;

    fn setup() -> (Router, Arc<RateLimiter>, MockClock) {
        let clock = MockClock::starting_now();
        let limiter = Arc::new(
            RateLimiter::new(
                ShieldConfig::default(),
                clock.shared(),
                SecurityEventBroadcaster::new(),
            )
            .unwrap(),
        );
        (admin_router(limiter.clone()), limiter, clock)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_stats() {
        let (app, limiter, _) = setup();
        limiter.check(&RequestInfo::new("10.0.0.1", "/")).unwrap();

        let request = Request::builder()
            .uri("/stats")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"totalTrackedIPs": 1, "blockedIPs": 0, "recentRequests": 1})
        );
    }

    #[tokio::test]
    async fn test_block_with_defaults() {
        let (app, limiter, clock) = setup();

        let (status, body) = send(app, post_json("/block", &json!({"ip": "10.0.0.9"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], MANUAL_BLOCK_REASON);
        let until: DateTime<Utc> = serde_json::from_value(body["until"].clone()).unwrap();
        assert_eq!(until, clock.now() + TimeDelta::minutes(15));
        assert!(limiter.store().is_blocked(&ClientKey::new("10.0.0.9")).unwrap());
    }

    #[tokio::test]
    async fn test_block_with_duration() {
        let (app, limiter, clock) = setup();

        let body = json!({"ip": "10.0.0.9", "reason": "scraping", "durationMs": 5000});
        let (status, _) = send(app, post_json("/block", &body)).await;
        assert_eq!(status, StatusCode::OK);

        clock.advance_ms(5_000);
        assert!(!limiter.store().is_blocked(&ClientKey::new("10.0.0.9")).unwrap());
    }

    #[tokio::test]
    async fn test_block_rejects_bad_input() {
        let (app, _, _) = setup();

        let (status, body) = send(app.clone(), post_json("/block", &json!({"ip": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");

        let body = json!({"ip": "10.0.0.9", "durationMs": 0});
        let (status, _) = send(app, post_json("/block", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_block_rejects_unrepresentable_duration() {
        let (app, limiter, _) = setup();

        for duration_ms in [u64::MAX, u64::try_from(i64::MAX).unwrap()] {
            let body = json!({"ip": "10.0.0.9", "durationMs": duration_ms});
            let (status, body) = send(app.clone(), post_json("/block", &body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "invalid_request");
        }
        assert!(limiter.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_unblock() {
        let (app, limiter, _) = setup();
        limiter
            .block_ip("10.0.0.9", "manual", Duration::from_secs(60))
            .unwrap();

        let (status, body) =
            send(app.clone(), post_json("/unblock", &json!({"ip": "10.0.0.9"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unblocked"], true);

        let (_, body) = send(app, post_json("/unblock", &json!({"ip": "10.0.0.9"}))).await;
        assert_eq!(body["unblocked"], false);
    }

    #[tokio::test]
    async fn test_clear() {
        let (app, limiter, _) = setup();
        limiter.check(&RequestInfo::new("10.0.0.1", "/")).unwrap();
        limiter.check(&RequestInfo::new("10.0.0.2", "/")).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/clear")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], 2);
        assert!(limiter.store().is_empty().unwrap());
    }
}
