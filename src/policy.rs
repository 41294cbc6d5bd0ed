//! Alert deduplication.
//!
//! Each run re-evaluates a domain from its persisted `last_notified_days`:
//!
//! - above the threshold nothing fires, and any outstanding alert record is
//!   cleared so the next approach to expiry alerts again;
//! - at or below the threshold an alert fires when none is outstanding or
//!   when the certificate is strictly closer to expiry than at the last alert;
//! - test mode always alerts.

use serde::Serialize;

/// What the monitor should do for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Send an alert and, once delivered, record `store` as the last notified value.
    Alert { store: i64 },
    /// Stay quiet. With `clear_prior` the outstanding alert record is dropped.
    NoAlert { clear_prior: bool },
}

impl Decision {
    pub fn is_alert(&self) -> bool {
        matches!(self, Decision::Alert { .. })
    }
}

pub fn decide(days_left: i64, prior: Option<i64>, threshold: i64, test_mode: bool) -> Decision {
    if test_mode {
        return Decision::Alert { store: days_left };
    }

    if days_left > threshold {
        return Decision::NoAlert {
            clear_prior: prior.is_some(),
        };
    }

    match prior {
        Some(last) if days_left >= last => Decision::NoAlert { clear_prior: false },
        _ => Decision::Alert { store: days_left },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: i64 = 5;

    #[test]
    fn test_healthy_certificate_without_record() {
        assert_eq!(
            decide(10, None, THRESHOLD, false),
            Decision::NoAlert { clear_prior: false }
        );
    }

    #[test]
    fn test_first_alert_inside_window() {
        assert_eq!(decide(3, None, THRESHOLD, false), Decision::Alert { store: 3 });
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(decide(5, None, THRESHOLD, false), Decision::Alert { store: 5 });
        assert_eq!(
            decide(6, None, THRESHOLD, false),
            Decision::NoAlert { clear_prior: false }
        );
    }

    #[test]
    fn test_same_days_is_suppressed() {
        assert_eq!(
            decide(3, Some(3), THRESHOLD, false),
            Decision::NoAlert { clear_prior: false }
        );
    }

    #[test]
    fn test_further_from_expiry_is_suppressed() {
        assert_eq!(
            decide(4, Some(3), THRESHOLD, false),
            Decision::NoAlert { clear_prior: false }
        );
    }

    #[test]
    fn test_strictly_closer_realerts() {
        assert_eq!(decide(1, Some(3), THRESHOLD, false), Decision::Alert { store: 1 });
    }

    #[test]
    fn test_expired_certificate_escalates() {
        assert_eq!(decide(-1, Some(0), THRESHOLD, false), Decision::Alert { store: -1 });
    }

    #[test]
    fn test_renewal_clears_and_resets_cycle() {
        assert_eq!(
            decide(8, Some(1), THRESHOLD, false),
            Decision::NoAlert { clear_prior: true }
        );
        // Record cleared, so the next approach alerts again
        assert_eq!(decide(3, None, THRESHOLD, false), Decision::Alert { store: 3 });
    }

    #[test]
    fn test_test_mode_always_alerts() {
        assert_eq!(decide(90, None, THRESHOLD, true), Decision::Alert { store: 90 });
        assert_eq!(decide(3, Some(3), THRESHOLD, true), Decision::Alert { store: 3 });
        assert_eq!(decide(8, Some(1), THRESHOLD, true), Decision::Alert { store: 8 });
    }
}
