//! Message retention policy.
//!
//! Chat messages expire 48 hours after sending unless an institution on
//! the PREMIUM plan is involved, in which case they are kept permanently.

use beacon_protocol::PartyKind;
use std::time::{SystemTime, UNIX_EPOCH};

/// Retention window for expiring messages.
pub const EXPIRY_WINDOW_MS: u64 = 48 * 60 * 60 * 1000;

/// Subscription plan that lifts the retention window.
pub const PERMANENT_PLAN: &str = "PREMIUM";

/// Current Unix time in milliseconds.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Which party's subscription plan governs retention for a message.
///
/// Only meaningful when at least one side is an institution: the
/// institution side is the sender when the sender is an institution,
/// otherwise the receiver.
#[must_use]
pub fn governing_institution<'a>(
    sender_type: PartyKind,
    sender_id: &'a str,
    receiver_id: &'a str,
) -> &'a str {
    if sender_type == PartyKind::Institution {
        sender_id
    } else {
        receiver_id
    }
}

/// Compute the expiry instant for a message sent at `now`.
///
/// Plain user to plain user always expires after the retention window,
/// regardless of any plan. When either side is an institution, that
/// institution's plan decides: [`PERMANENT_PLAN`] keeps the message
/// forever, anything else (including no plan at all) expires it.
#[must_use]
pub fn message_expiry(
    sender_type: PartyKind,
    receiver_role: PartyKind,
    plan: Option<&str>,
    now: u64,
) -> Option<u64> {
    if sender_type == PartyKind::User && receiver_role == PartyKind::User {
        return Some(now + EXPIRY_WINDOW_MS);
    }

    match plan {
        Some(PERMANENT_PLAN) => None,
        _ => Some(now + EXPIRY_WINDOW_MS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn test_user_to_user_always_expires() {
        assert_eq!(
            message_expiry(PartyKind::User, PartyKind::User, None, NOW),
            Some(NOW + EXPIRY_WINDOW_MS)
        );
        // Even a PREMIUM plan is irrelevant between two plain users.
        assert_eq!(
            message_expiry(PartyKind::User, PartyKind::User, Some("PREMIUM"), NOW),
            Some(NOW + EXPIRY_WINDOW_MS)
        );
    }

    #[test]
    fn test_premium_institution_is_permanent() {
        assert_eq!(
            message_expiry(PartyKind::Institution, PartyKind::User, Some("PREMIUM"), NOW),
            None
        );
        assert_eq!(
            message_expiry(PartyKind::User, PartyKind::Institution, Some("PREMIUM"), NOW),
            None
        );
    }

    #[test]
    fn test_lower_plans_expire() {
        for plan in [None, Some("BASIC"), Some("BUSINESS"), Some("ENTERPRISE")] {
            assert_eq!(
                message_expiry(PartyKind::Institution, PartyKind::User, plan, NOW),
                Some(NOW + EXPIRY_WINDOW_MS),
                "plan {plan:?} should expire"
            );
        }
    }

    #[test]
    fn test_governing_institution_side() {
        assert_eq!(
            governing_institution(PartyKind::Institution, "inst-1", "u2"),
            "inst-1"
        );
        assert_eq!(
            governing_institution(PartyKind::User, "u1", "inst-2"),
            "inst-2"
        );
    }
}
