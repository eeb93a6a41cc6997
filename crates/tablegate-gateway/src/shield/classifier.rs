//! Endpoint classification.

use tablegate_core::TierCategory;

const AVAILABILITY_MARKERS: &[&str] = &["availability", "check-date", "available-dates"];
const BOOKING_MARKERS: &[&str] = &["booking", "reservation"];
const QUOTE_MARKERS: &[&str] = &["quote", "calculate"];

/// Maps a request path to exactly one tier category.
///
/// Markers are checked in a fixed order (availability, booking, quote) and
/// matched case-insensitively anywhere in the path. Anything else is
/// [`TierCategory::General`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointClassifier;

impl EndpointClassifier {
    /// Create a new classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a request path.
    #[must_use]
    pub fn classify(&self, path: &str) -> TierCategory {
        let path = path.to_ascii_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|m| path.contains(m));

        if contains_any(AVAILABILITY_MARKERS) {
            TierCategory::Availability
        } else if contains_any(BOOKING_MARKERS) {
            TierCategory::Booking
        } else if contains_any(QUOTE_MARKERS) {
            TierCategory::Quote
        } else {
            TierCategory::General
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_categories() {
        let classifier = EndpointClassifier::new();
        assert_eq!(classifier.classify("/api/availability"), TierCategory::Availability);
        assert_eq!(classifier.classify("/api/check-date/2026-06-01"), TierCategory::Availability);
        assert_eq!(classifier.classify("/api/bookings"), TierCategory::Booking);
        assert_eq!(classifier.classify("/api/reservations/42"), TierCategory::Booking);
        assert_eq!(classifier.classify("/api/quote"), TierCategory::Quote);
        assert_eq!(classifier.classify("/api/calculate-price"), TierCategory::Quote);
    }

    #[test]
    fn test_default_is_general() {
        let classifier = EndpointClassifier::new();
        assert_eq!(classifier.classify("/"), TierCategory::General);
        assert_eq!(classifier.classify("/api/menu"), TierCategory::General);
        assert_eq!(classifier.classify(""), TierCategory::General);
    }

    #[test]
    fn test_order_is_significant() {
        let classifier = EndpointClassifier::new();
        // availability wins over booking, booking over quote
        assert_eq!(
            classifier.classify("/api/booking/availability"),
            TierCategory::Availability
        );
        assert_eq!(classifier.classify("/api/booking/quote"), TierCategory::Booking);
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = EndpointClassifier::new();
        assert_eq!(classifier.classify("/API/Booking"), TierCategory::Booking);
    }
}
