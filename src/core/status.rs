//! Receipt state machine.
//!
//! Pure functions that fold the verification statuses of a receipt's items into one
//! receipt status and a cashback total. The same fold runs at submission time and again
//! whenever an alias decision rewrites items; only the status prefix differs.

use crate::entities::ReceiptVerificationStatus;
use crate::models::{ParsedLineItem, ProductClaim, ReceiptItem};
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Which step of the lifecycle produced the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial submission; outcomes get the `auto_` prefix
    Submission,
    /// Re-evaluation after an alias decision; outcomes get the `manually_` prefix
    Review,
}

/// Outcome of evaluating a receipt's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: ReceiptVerificationStatus,
    /// Sum of cashback over verified items, in minor units
    pub final_cashback: i64,
}

/// Folds item statuses into a receipt status.
///
/// A pending item dominates everything else. Otherwise verified and rejected items give a
/// partial verification, verified alone a full one, rejected alone a rejection.
/// `current` is kept when a review-phase receipt has no cashback items at all.
#[must_use]
pub fn evaluate(
    items: &[ReceiptItem],
    phase: Phase,
    current: ReceiptVerificationStatus,
) -> Verdict {
    let mut has_verified = false;
    let mut has_rejected = false;
    let mut has_pending = false;

    for item in items.iter().filter_map(ReceiptItem::as_cashback) {
        has_verified |= item.status.is_verified();
        has_rejected |= item.status.is_rejected();
        has_pending |= item.status.is_pending();
    }

    let status = match (has_pending, has_verified, has_rejected, phase) {
        (true, _, _, _) => ReceiptVerificationStatus::ManualReview,
        (false, true, true, Phase::Submission) => ReceiptVerificationStatus::AutoPartiallyVerified,
        (false, true, true, Phase::Review) => ReceiptVerificationStatus::ManuallyPartiallyVerified,
        (false, true, false, Phase::Submission) => ReceiptVerificationStatus::AutoVerified,
        (false, true, false, Phase::Review) => ReceiptVerificationStatus::ManuallyVerified,
        (false, false, true, Phase::Submission) => ReceiptVerificationStatus::AutoRejected,
        (false, false, true, Phase::Review) => ReceiptVerificationStatus::ManuallyRejected,
        // Nothing was claimed at submission: there is nothing to pay out.
        (false, false, false, Phase::Submission) => ReceiptVerificationStatus::AutoRejected,
        (false, false, false, Phase::Review) => {
            warn!("No cashback items to re-evaluate, keeping status {:?}", current);
            current
        }
    };

    Verdict {
        status,
        final_cashback: final_cashback(items),
    }
}

/// Sum of cashback over items whose status is verified. Product claims contribute nothing.
#[must_use]
pub fn final_cashback(items: &[ReceiptItem]) -> i64 {
    items
        .iter()
        .filter_map(ReceiptItem::as_cashback)
        .filter(|item| item.status.is_verified())
        .map(|item| item.cashback)
        .sum()
}

/// Whether a receipt dated `receipt_date` may still be submitted at `now`.
#[must_use]
pub fn is_within_validity_window(
    receipt_date: DateTime<Utc>,
    now: DateTime<Utc>,
    valid_days: i64,
) -> bool {
    now - receipt_date <= Duration::days(valid_days)
}

/// Items and verdict for a receipt submitted after its validity window.
///
/// Every line becomes a product claim regardless of what the user asked for.
#[must_use]
pub fn late_submission(items: &[ParsedLineItem]) -> (Vec<ReceiptItem>, Verdict) {
    let items = items
        .iter()
        .map(|line| {
            ReceiptItem::ProductClaim(ProductClaim {
                name: line.name.clone(),
                props: line.props.clone(),
            })
        })
        .collect();
    (
        items,
        Verdict {
            status: ReceiptVerificationStatus::AutoRejectedLateSubmission,
            final_cashback: 0,
        },
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::ItemVerificationStatus;
    use crate::models::{CashbackItem, ItemProps};
    use chrono::TimeZone;

    fn props() -> ItemProps {
        ItemProps {
            department: "1".to_string(),
            unit_price: 100,
            quantity: 1,
            measure_unit: "pcs".to_string(),
            total_price: 100,
        }
    }

    fn cashback(status: ItemVerificationStatus, amount: i64) -> ReceiptItem {
        ReceiptItem::Cashback(CashbackItem {
            name: format!("{status:?}"),
            props: props(),
            product_id: 1,
            alias_id: Some(1),
            status,
            cashback: amount,
        })
    }

    fn claim() -> ReceiptItem {
        ReceiptItem::ProductClaim(ProductClaim {
            name: "Bag".to_string(),
            props: props(),
        })
    }

    #[test]
    fn test_pending_item_dominates() {
        let items = [
            cashback(ItemVerificationStatus::ManualReview, 500),
            cashback(ItemVerificationStatus::AutoVerifiedCanon, 300),
        ];
        let verdict = evaluate(
            &items,
            Phase::Submission,
            ReceiptVerificationStatus::ManualReview,
        );
        assert_eq!(verdict.status, ReceiptVerificationStatus::ManualReview);
        assert_eq!(verdict.final_cashback, 300);
    }

    #[test]
    fn test_verified_and_rejected_is_partial() {
        let items = [
            cashback(ItemVerificationStatus::AutoVerifiedCanon, 300),
            cashback(ItemVerificationStatus::AutoRejectedAlias, 500),
            claim(),
        ];
        let verdict = evaluate(
            &items,
            Phase::Submission,
            ReceiptVerificationStatus::ManualReview,
        );
        assert_eq!(
            verdict.status,
            ReceiptVerificationStatus::AutoPartiallyVerified
        );
        assert_eq!(verdict.final_cashback, 300);
    }

    #[test]
    fn test_review_phase_uses_manual_prefix() {
        let partial = [
            cashback(ItemVerificationStatus::ManuallyVerifiedAlias, 200),
            cashback(ItemVerificationStatus::AutoRejectedAlias, 500),
        ];
        assert_eq!(
            evaluate(&partial, Phase::Review, ReceiptVerificationStatus::ManualReview).status,
            ReceiptVerificationStatus::ManuallyPartiallyVerified
        );

        let verified = [
            cashback(ItemVerificationStatus::ManuallyVerifiedAlias, 200),
            cashback(ItemVerificationStatus::AutoVerifiedCanon, 100),
        ];
        let verdict = evaluate(&verified, Phase::Review, ReceiptVerificationStatus::ManualReview);
        assert_eq!(verdict.status, ReceiptVerificationStatus::ManuallyVerified);
        assert_eq!(verdict.final_cashback, 300);

        let rejected = [cashback(ItemVerificationStatus::ManuallyRejectedAlias, 200)];
        let verdict = evaluate(&rejected, Phase::Review, ReceiptVerificationStatus::ManualReview);
        assert_eq!(verdict.status, ReceiptVerificationStatus::ManuallyRejected);
        assert_eq!(verdict.final_cashback, 0);
    }

    #[test]
    fn test_submission_outcomes() {
        let verified = [
            cashback(ItemVerificationStatus::AutoVerifiedAlias, 200),
            claim(),
        ];
        assert_eq!(
            evaluate(&verified, Phase::Submission, ReceiptVerificationStatus::ManualReview).status,
            ReceiptVerificationStatus::AutoVerified
        );

        let rejected = [cashback(ItemVerificationStatus::AutoRejectedAlias, 200)];
        assert_eq!(
            evaluate(&rejected, Phase::Submission, ReceiptVerificationStatus::ManualReview).status,
            ReceiptVerificationStatus::AutoRejected
        );
    }

    #[test]
    fn test_no_cashback_items() {
        let items = [claim()];
        assert_eq!(
            evaluate(&items, Phase::Submission, ReceiptVerificationStatus::ManualReview).status,
            ReceiptVerificationStatus::AutoRejected
        );
        assert_eq!(
            evaluate(&items, Phase::Review, ReceiptVerificationStatus::ManualReview).status,
            ReceiptVerificationStatus::ManualReview
        );
        assert_eq!(
            evaluate(&[], Phase::Review, ReceiptVerificationStatus::ManuallyVerified),
            Verdict {
                status: ReceiptVerificationStatus::ManuallyVerified,
                final_cashback: 0,
            }
        );
    }

    #[test]
    fn test_validity_window() {
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let on_boundary = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        assert!(is_within_validity_window(date, on_boundary, 5));

        let past = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 1).unwrap();
        assert!(!is_within_validity_window(date, past, 5));

        let same_day = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        assert!(is_within_validity_window(date, same_day, 1));
    }

    #[test]
    fn test_late_submission_turns_everything_into_claims() {
        let lines = [
            ParsedLineItem {
                name: "Milk".to_string(),
                props: props(),
            },
            ParsedLineItem {
                name: "Bread".to_string(),
                props: props(),
            },
        ];
        let (items, verdict) = late_submission(&lines);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.as_cashback().is_none()));
        assert_eq!(
            verdict.status,
            ReceiptVerificationStatus::AutoRejectedLateSubmission
        );
        assert_eq!(verdict.final_cashback, 0);
    }
}
