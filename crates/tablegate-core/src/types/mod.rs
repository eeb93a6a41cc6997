//! Core types used throughout tablegate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity used to bucket a client's request history.
///
/// Usually the resolved client IP address. Requests whose address cannot be
/// resolved share the [`ClientKey::unknown`] bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientKey(pub String);

impl ClientKey {
    /// Sentinel identity for clients without a resolvable address.
    pub const UNKNOWN: &'static str = "unknown";

    /// Create a new client key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The shared bucket for unidentified clients.
    #[must_use]
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    /// Whether this is the shared unidentified bucket.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<std::net::IpAddr> for ClientKey {
    fn from(ip: std::net::IpAddr) -> Self {
        Self(ip.to_string())
    }
}

/// Logical endpoint category. Each category has its own tier policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierCategory {
    /// Anything not matched by a more specific category.
    General,
    /// Date and availability checks.
    Availability,
    /// Booking and reservation submissions.
    Booking,
    /// Quote and price calculations.
    Quote,
}

impl TierCategory {
    /// All categories, in catalog order.
    pub const ALL: [Self; 4] = [Self::General, Self::Availability, Self::Booking, Self::Quote];

    /// Get the category as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Availability => "availability",
            Self::Booking => "booking",
            Self::Quote => "quote",
        }
    }
}

impl fmt::Display for TierCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TierCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown tier category: {s}"))
    }
}
