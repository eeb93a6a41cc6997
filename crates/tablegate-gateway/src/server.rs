//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tablegate_core::{Config, SharedClock, ShieldConfig, SystemClock};

use crate::GatewayError;
use crate::admin::admin_router;
use crate::events::SecurityEventBroadcaster;
use crate::middleware::admission;
use crate::shield::{RateLimiter, spawn_sweeper};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable CORS.
    pub cors: bool,
    /// Request shield configuration.
    pub shield: ShieldConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            bind_address: "127.0.0.1".to_string(),
            cors: true,
            shield: ShieldConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Derive the server configuration from a loaded [`Config`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.gateway.port,
            bind_address: config.gateway.bind_address(),
            cors: config.gateway.cors,
            shield: config.shield.clone(),
        }
    }
}

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    limiter: Arc<RateLimiter>,
    routes: Router,
}

/// Builder for constructing a Gateway with its dependencies.
pub struct GatewayBuilder {
    config: GatewayConfig,
    clock: Option<SharedClock>,
    events: Option<SecurityEventBroadcaster>,
    routes: Router,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            clock: None,
            events: None,
            routes: Router::new(),
        }
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the clock the shield reads.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the security event broadcaster.
    #[must_use]
    pub fn with_event_broadcaster(mut self, broadcaster: SecurityEventBroadcaster) -> Self {
        self.events = Some(broadcaster);
        self
    }

    /// Add application routes. They sit behind the shield.
    #[must_use]
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the shield configuration is invalid.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let events = self.events.unwrap_or_default();
        let limiter = RateLimiter::new(self.config.shield.clone(), clock, events)?;

        Ok(Gateway {
            config: self.config,
            limiter: Arc::new(limiter),
            routes: self.routes,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Create a gateway with no application routes.
    ///
    /// # Errors
    ///
    /// Returns error if the shield configuration is invalid.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// Gateway configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Assemble the full router.
    ///
    /// `/health` and the admin API sit outside the shield. Application routes
    /// and the fallback sit behind it.
    #[must_use]
    pub fn router(&self) -> Router {
        let shielded = self
            .routes
            .clone()
            .fallback(not_found_handler)
            .layer(axum::middleware::from_fn_with_state(
                self.limiter.clone(),
                admission,
            ));

        let mut app = Router::new().route("/health", get(health_handler));
        if self.config.shield.admin_api {
            app = app.nest("/admin/shield", admin_router(self.limiter.clone()));
        }

        let mut app = app.merge(shielded).layer(TraceLayer::new_for_http());
        if self.config.cors {
            app = app.layer(CorsLayer::permissive());
        }
        app
    }

    /// Run the gateway server until interrupted.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the server fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let sweeper = spawn_sweeper(self.limiter.clone(), self.config.shield.sweep_interval());

        if self.config.shield.enabled {
            tracing::info!(
                counting = ?self.config.shield.counting,
                admin_api = self.config.shield.admin_api,
                "Request shield enabled"
            );
        } else {
            tracing::warn!("Request shield disabled, all requests pass through");
        }
        tracing::info!("Gateway listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = self.router();
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();
        result.map_err(|e| GatewayError::Server(e.to_string()))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutting down gateway");
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "path": uri.path(),
        })),
    )
}
