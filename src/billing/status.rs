use super::models::{EnrollmentStatus, MembershipStatus, SubscriptionStatus};

/// key: status-unifier -> single canonical membership status
///
/// Precedence, first match wins:
/// 1. a live subscription grants access whatever the enrollment says;
/// 2. a lapsed subscription (`canceled`, `expired`, `past_due`) revokes it;
/// 3. no subscription but an active enrollment stays active (one-time plans);
/// 4. no subscription and a pending/approved enrollment is waiting on payment;
/// 5. otherwise the enrollment status verbatim, or `unknown`.
///
/// Rule 3 trusts the enrollment table without independent proof of payment.
pub fn unify(
    subscription: Option<&SubscriptionStatus>,
    enrollment: Option<&EnrollmentStatus>,
) -> MembershipStatus {
    match (subscription, enrollment) {
        (Some(SubscriptionStatus::Active), _) => MembershipStatus::Active,
        (Some(status), _) if status.is_lapsed() => MembershipStatus::Cancelled,
        (None, Some(EnrollmentStatus::Active)) => MembershipStatus::Active,
        (None, Some(EnrollmentStatus::Pending | EnrollmentStatus::Approved)) => {
            MembershipStatus::PendingPayment
        }
        (_, Some(status)) => MembershipStatus::from(status),
        (_, None) => MembershipStatus::Unknown,
    }
}

/// String-level entry point for callers that hold raw provider/table values.
pub fn unify_raw(subscription: Option<&str>, enrollment: Option<&str>) -> String {
    let subscription = subscription.map(SubscriptionStatus::from);
    let enrollment = enrollment.map(EnrollmentStatus::from);
    unify(subscription.as_ref(), enrollment.as_ref())
        .as_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBSCRIPTION_STATUSES: [Option<&str>; 9] = [
        None,
        Some("active"),
        Some("canceled"),
        Some("expired"),
        Some("past_due"),
        Some("trialing"),
        Some("paused"),
        Some("incomplete"),
        Some("cancelled"),
    ];

    const ENROLLMENT_STATUSES: [Option<&str>; 6] = [
        None,
        Some("pending"),
        Some("approved"),
        Some("active"),
        Some("cancelled"),
        Some("on_hold"),
    ];

    fn expected(subscription: Option<&str>, enrollment: Option<&str>) -> String {
        match (subscription, enrollment) {
            (Some("active"), _) => "active".into(),
            (Some("canceled" | "expired" | "past_due"), _) => "cancelled".into(),
            (None, Some("active")) => "active".into(),
            (None, Some("pending" | "approved")) => "pending_payment".into(),
            (_, Some(raw)) => raw.to_string(),
            (_, None) => "unknown".into(),
        }
    }

    #[test]
    fn every_combination_resolves() {
        for subscription in SUBSCRIPTION_STATUSES {
            for enrollment in ENROLLMENT_STATUSES {
                assert_eq!(
                    unify_raw(subscription, enrollment),
                    expected(subscription, enrollment),
                    "subscription={subscription:?} enrollment={enrollment:?}"
                );
            }
        }
    }

    #[test]
    fn precedence_examples() {
        assert_eq!(unify_raw(Some("active"), Some("cancelled")), "active");
        assert_eq!(unify_raw(Some("active"), None), "active");
        assert_eq!(unify_raw(Some("canceled"), Some("active")), "cancelled");
        assert_eq!(unify_raw(Some("past_due"), Some("pending")), "cancelled");
        assert_eq!(unify_raw(None, Some("active")), "active");
        assert_eq!(unify_raw(None, Some("pending")), "pending_payment");
        assert_eq!(unify_raw(None, Some("approved")), "pending_payment");
        assert_eq!(unify_raw(None, None), "unknown");
        assert_eq!(unify_raw(Some("trialing"), Some("approved")), "approved");
        assert_eq!(unify_raw(Some("paused"), None), "unknown");
    }

    #[test]
    fn only_active_grants_access() {
        assert!(unify(Some(&SubscriptionStatus::Active), None).grants_access());
        assert!(!unify(None, Some(&EnrollmentStatus::Pending)).grants_access());
        assert!(!unify(Some(&SubscriptionStatus::Expired), Some(&EnrollmentStatus::Active))
            .grants_access());
    }
}
