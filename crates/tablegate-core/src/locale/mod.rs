//! Client-facing message catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TierCategory;

/// Language of messages returned to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English.
    #[default]
    En,
    /// German.
    De,
}

impl Locale {
    /// Default denial message for a tier.
    #[must_use]
    pub const fn tier_message(self, category: TierCategory) -> &'static str {
        match (self, category) {
            (Self::En, TierCategory::General) => {
                "Too many requests. Please try again in a minute."
            }
            (Self::En, TierCategory::Availability) => {
                "Too many availability checks. Please wait a moment before checking more dates."
            }
            (Self::En, TierCategory::Booking) => {
                "Too many booking requests. Please wait a minute before submitting again."
            }
            (Self::En, TierCategory::Quote) => {
                "Too many quote calculations. Please wait a moment and try again."
            }
            (Self::De, TierCategory::General) => {
                "Zu viele Anfragen. Bitte versuchen Sie es in einer Minute erneut."
            }
            (Self::De, TierCategory::Availability) => {
                "Zu viele Verfügbarkeitsanfragen. Bitte warten Sie einen Moment, bevor Sie weitere Termine prüfen."
            }
            (Self::De, TierCategory::Booking) => {
                "Zu viele Buchungsanfragen. Bitte warten Sie eine Minute, bevor Sie erneut senden."
            }
            (Self::De, TierCategory::Quote) => {
                "Zu viele Angebotsberechnungen. Bitte warten Sie einen Moment und versuchen Sie es erneut."
            }
        }
    }

    /// Message for a client under an active block, naming the unblock time.
    #[must_use]
    pub fn blocked_message(self, reason: &str, until: DateTime<Utc>) -> String {
        let when = self.format_time(until);
        match self {
            Self::En => {
                format!("Access temporarily blocked ({reason}). Please try again after {when}.")
            }
            Self::De => format!(
                "Zugriff vorübergehend gesperrt ({reason}). Bitte versuchen Sie es nach {when} erneut."
            ),
        }
    }

    /// Human-readable timestamp in this locale's convention.
    #[must_use]
    pub fn format_time(self, at: DateTime<Utc>) -> String {
        match self {
            Self::En => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            Self::De => at.format("%d.%m.%Y %H:%M:%S UTC").to_string(),
        }
    }
}
