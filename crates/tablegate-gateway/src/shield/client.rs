//! Client identity resolution.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use tablegate_core::ClientKey;

/// Resolves the [`ClientKey`] of a request.
///
/// Consults the configured headers in order and takes the first hop of the
/// first one present. Falls back to the connection peer address when the
/// server exposes it, and to the shared `unknown` bucket otherwise.
///
/// Header values are trusted as-is. Clients that reach the gateway without a
/// proxy in front can spoof them.
#[derive(Debug, Clone)]
pub struct ClientResolver {
    headers: Vec<String>,
}

impl ClientResolver {
    /// Create a resolver over the given header names.
    #[must_use]
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Resolve from headers and an optional peer address.
    #[must_use]
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientKey {
        self.from_headers(headers)
            .or_else(|| peer.map(|addr| ClientKey::from(addr.ip())))
            .unwrap_or_else(ClientKey::unknown)
    }

    /// Resolve from an HTTP request, using `ConnectInfo` if present.
    #[must_use]
    pub fn resolve_request<B>(&self, request: &Request<B>) -> ClientKey {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        self.resolve(request.headers(), peer)
    }

    fn from_headers(&self, headers: &HeaderMap) -> Option<ClientKey> {
        self.headers.iter().find_map(|name| {
            let value = headers.get(name.as_str())?.to_str().ok()?;
            let first = value.split(',').next()?.trim();
            (!first.is_empty()).then(|| ClientKey::new(first))
        })
    }
}

impl Default for ClientResolver {
    fn default() -> Self {
        Self::new(tablegate_core::ShieldConfig::default().client_headers)
    }
}
