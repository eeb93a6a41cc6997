//! Admission middleware.
//!
//! Puts a [`RateLimiter`] in front of an axum router:
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/bookings", post(create_booking))
//!     .layer(axum::middleware::from_fn_with_state(limiter, admission));
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shield::{Decision, RateLimiter};

/// Limit of the request's tier.
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
/// Requests left in the current window.
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// Unix time at which the window (or block) releases.
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Admit or reject a request.
///
/// Allowed requests run the inner service and get rate limit headers added.
/// Denied requests are answered here with 429 (tier limit) or 403 (block).
/// Internal shield faults are logged and the request is let through.
pub async fn admission(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.config().enabled {
        return next.run(request).await;
    }

    let info = limiter.inspect(&request);
    let decision = match limiter.check(&info) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(
                client = %info.client,
                path = %info.path,
                error = %e,
                "Shield check failed, admitting request"
            );
            return next.run(request).await;
        }
    };

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_rate_limit_headers(response.headers_mut(), &decision);
        response
    } else {
        Rejection {
            decision,
            now: limiter.now(),
        }
        .into_response()
    }
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(decision.reset_time.timestamp()),
    );
}

/// A denied admission decision rendered as an HTTP response.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// The denial.
    pub decision: Decision,
    /// Time of the decision, for `Retry-After`.
    pub now: DateTime<Utc>,
}

/// Error body for denied requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    message: String,
    retry_after: DateTime<Utc>,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (status, error) = if self.decision.is_blocked() {
            (StatusCode::FORBIDDEN, "Access temporarily blocked")
        } else {
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
        };

        let body = RejectionBody {
            error,
            message: self.decision.message.clone().unwrap_or_default(),
            retry_after: self.decision.reset_time,
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        apply_rate_limit_headers(headers, &self.decision);
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from(self.decision.retry_after_secs(self.now)),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{Router, body::Body, routing::get};
    use chrono::TimeZone;
    use serde_json::Value;
    use tablegate_core::{Clock, MockClock, ShieldConfig};
    use tower::ServiceExt;

    use crate::events::SecurityEventBroadcaster;

    fn app(config: ShieldConfig, clock: &MockClock) -> (Router, Arc<RateLimiter>) {
        let limiter = Arc::new(
            RateLimiter::new(config, clock.shared(), SecurityEventBroadcaster::new()).unwrap(),
        );
        let router = Router::new()
            .route("/api/bookings", get(|| async { "booked" }))
            .route("/api/menu", get(|| async { "menu" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter.clone(),
                admission,
            ));
        (router, limiter)
    }

    fn get_from(path: &str, ip: &str) -> Request {
        Request::builder()
            .uri(path)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn header(response: &Response, name: &str) -> String {
        response.headers()[name].to_str().unwrap().to_string()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_has_headers() {
        let clock = MockClock::starting_now();
        let (app, _) = app(ShieldConfig::default(), &clock);

        let response = app.oneshot(get_from("/api/bookings", "1.2.3.4")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, X_RATELIMIT_LIMIT), "50");
        assert_eq!(header(&response, X_RATELIMIT_REMAINING), "49");
        let reset: i64 = header(&response, X_RATELIMIT_RESET).parse().unwrap();
        assert_eq!(reset, (clock.now() + chrono::TimeDelta::seconds(60)).timestamp());
    }

    #[tokio::test]
    async fn test_rate_limited_request_gets_429() {
        let clock = MockClock::starting_now();
        let mut config = ShieldConfig::default();
        config.tiers.booking.max = 2;
        let (app, _) = app(config, &clock);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get_from("/api/bookings", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(get_from("/api/bookings", "1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, X_RATELIMIT_REMAINING), "0");
        assert_eq!(header(&response, "retry-after"), "60");

        let body = json_body(response).await;
        assert_eq!(body["error"], "Rate limit exceeded");
        assert!(body["message"].as_str().unwrap().contains("booking"));
        assert!(body["retryAfter"].is_string());
    }

    #[tokio::test]
    async fn test_blocked_client_gets_403() {
        let clock = MockClock::starting_now();
        let (app, limiter) = app(ShieldConfig::default(), &clock);
        limiter
            .block_ip("1.2.3.4", "manual", Duration::from_secs(90))
            .unwrap();

        let response = app
            .clone()
            .oneshot(get_from("/api/menu", "1.2.3.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(header(&response, "retry-after"), "90");
        let body = json_body(response).await;
        assert_eq!(body["error"], "Access temporarily blocked");
        assert!(body["message"].as_str().unwrap().contains("manual"));

        // Other clients are unaffected
        let response = app.oneshot(get_from("/api/menu", "5.6.7.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_shield_passes_through() {
        let clock = MockClock::starting_now();
        let mut config = ShieldConfig::default();
        config.enabled = false;
        config.tiers.booking.max = 1;
        let (app, limiter) = app(config, &clock);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(get_from("/api/bookings", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
        }
        assert!(limiter.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_internal_fault_fails_open() {
        // Window arithmetic underflows at the start of representable time
        let clock = MockClock::new(DateTime::<Utc>::MIN_UTC);
        let (app, _) = app(ShieldConfig::default(), &clock);

        let response = app.oneshot(get_from("/api/menu", "1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
    }

    #[test]
    fn test_rejection_rounds_retry_after_up() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let rejection = Rejection {
            decision: Decision {
                allowed: false,
                category: tablegate_core::TierCategory::General,
                limit: 100,
                remaining: 0,
                reset_time: now + chrono::TimeDelta::milliseconds(2_300),
                message: Some("slow down".to_string()),
                denial: Some(crate::shield::Denial::RateLimited),
            },
            now,
        };

        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, "retry-after"), "3");
    }
}
