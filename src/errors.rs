//! Unified error type for the reconciliation engine.
//!
//! Every operation returns [`Result`]. Variants are grouped by the component that raises
//! them; all of them are terminal for the triggering request except
//! [`Error::ConcurrentModification`], which the propagator retries a bounded number of times.

use crate::entities::AliasStatus;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    // Fiscal data parser
    /// The QR payload or URL does not normalize into a ticket-lookup URL.
    #[error("Malformed receipt reference '{reference}': {reason}")]
    MalformedReference {
        /// The raw reference as submitted
        reference: String,
        /// What was wrong with it
        reason: String,
    },

    /// The fiscal ticket service could not be reached or answered with a failure status.
    #[error("Fiscal ticket service unavailable: {message}")]
    UpstreamUnavailable {
        /// Transport or status detail
        message: String,
    },

    /// The fiscal ticket service answered with something that is not a ticket.
    #[error("Invalid fiscal ticket payload: {message}")]
    InvalidUpstreamPayload {
        /// Parse detail
        message: String,
    },

    /// A required ticket field is missing or invalid.
    #[error("Incomplete receipt data: {field} missing or invalid")]
    IncompleteReceiptData {
        /// Name of the offending ticket field
        field: String,
    },

    /// Line items do not add up to the ticket total.
    #[error("Sum of item totals ({items_total}) does not match receipt total ({receipt_total})")]
    TotalsMismatch {
        /// Sum of the parsed item totals
        items_total: i64,
        /// Total reported by the ticket
        receipt_total: i64,
    },

    // Matcher
    /// One or more claimed products are missing, ineligible or unpublished.
    #[error("Products are not valid, cashback-eligible and published: {product_ids:?}")]
    InvalidProductReference {
        /// The product ids that failed to resolve
        product_ids: Vec<i64>,
    },

    /// The claim mapping itself is unusable.
    #[error("Invalid claim mapping: {message}")]
    InvalidClaimMapping {
        /// Description of the problem
        message: String,
    },

    /// A new alias could not be stored for a claimed item.
    #[error("Failed to create alias '{name}': {message}")]
    AliasCreationFailed {
        /// The line-item name the alias was meant for
        name: String,
        /// Storage detail
        message: String,
    },

    // Propagator
    /// Aliases may only move from `unverified` to `verified` or `rejected`, once.
    #[error("Illegal alias transition for alias {alias_id}: {from:?} -> {to:?}")]
    IllegalAliasTransition {
        /// Alias being decided
        alias_id: i64,
        /// Status found in storage
        from: AliasStatus,
        /// Requested status
        to: AliasStatus,
    },

    /// Alias lookup failed.
    #[error("Alias not found: {alias_id}")]
    AliasNotFound {
        /// The missing alias id
        alias_id: i64,
    },

    /// A receipt changed between read and write more often than the retry budget allows.
    #[error("Receipt {receipt_id} was modified concurrently ({attempts} attempts)")]
    ConcurrentModification {
        /// The contended receipt
        receipt_id: i64,
        /// How many read-modify-write attempts were made
        attempts: u32,
    },

    // Submission
    /// A receipt with the same fiscal id or QR data already exists.
    #[error("Receipt already submitted ({key})")]
    DuplicateSubmission {
        /// Which dedup key collided
        key: String,
    },

    /// User lookup failed.
    #[error("User not found: {user_id}")]
    UserNotFound {
        /// The missing user id
        user_id: i64,
    },

    /// Receipt lookup failed.
    #[error("Receipt not found: {receipt_id}")]
    ReceiptNotFound {
        /// The missing receipt id
        receipt_id: i64,
    },

    /// Cashback request lookup failed.
    #[error("Cashback request not found: {request_id}")]
    CashbackRequestNotFound {
        /// The missing request id
        request_id: i64,
    },

    /// Invalid amount (zero, negative where positive is required).
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount in minor units
        amount: i64,
    },

    /// A stored row does not describe a valid domain value.
    #[error("Corrupt record: {message}")]
    CorruptRecord {
        /// What was inconsistent
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl Error {
    /// Whether retrying the same request later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. } | Self::UpstreamUnavailable { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(
            Error::ConcurrentModification {
                receipt_id: 1,
                attempts: 3
            }
            .is_transient()
        );
        assert!(
            Error::UpstreamUnavailable {
                message: "timeout".to_string()
            }
            .is_transient()
        );
        assert!(
            !Error::DuplicateSubmission {
                key: "fiscal_id".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_error_messages() {
        let err = Error::TotalsMismatch {
            items_total: 900,
            receipt_total: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Sum of item totals (900) does not match receipt total (1000)"
        );
    }
}
