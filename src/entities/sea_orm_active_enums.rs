//! String-backed status enums shared by several entities.
//!
//! The string values are the persisted representation and match the status names used by
//! the surrounding content platform, so they must not be renamed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Verification state of a product alias. Moves out of `Unverified` exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum AliasStatus {
    /// Awaiting a decision
    #[sea_orm(string_value = "unverified")]
    Unverified,
    /// Accepted as a name for the product
    #[sea_orm(string_value = "verified")]
    Verified,
    /// Refused as a name for the product
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl AliasStatus {
    /// Whether this status can be the target of an alias decision.
    #[must_use]
    pub const fn is_decision(self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }
}

/// Verification state of a single cashback item on a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ItemVerificationStatus {
    /// Waiting on an alias decision
    #[sea_orm(string_value = "manual_review")]
    ManualReview,
    /// Item name equals the product's canonical name
    #[sea_orm(string_value = "auto_verified_canon")]
    AutoVerifiedCanon,
    /// Item name matched an already verified alias
    #[sea_orm(string_value = "auto_verified_alias")]
    AutoVerifiedAlias,
    /// Alias was verified after the receipt was submitted
    #[sea_orm(string_value = "manually_verified_alias")]
    ManuallyVerifiedAlias,
    /// Item name matched an already rejected alias
    #[sea_orm(string_value = "auto_rejected_alias")]
    AutoRejectedAlias,
    /// Alias was rejected after the receipt was submitted
    #[sea_orm(string_value = "manually_rejected_alias")]
    ManuallyRejectedAlias,
}

impl ItemVerificationStatus {
    /// Statuses whose cashback counts towards the receipt total.
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(
            self,
            Self::AutoVerifiedCanon | Self::AutoVerifiedAlias | Self::ManuallyVerifiedAlias
        )
    }

    /// Statuses that mark the item as refused.
    #[must_use]
    pub const fn is_rejected(self) -> bool {
        matches!(self, Self::AutoRejectedAlias | Self::ManuallyRejectedAlias)
    }

    /// Whether the item still blocks finalization of its receipt.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::ManualReview)
    }
}

/// Verification state of a whole receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ReceiptVerificationStatus {
    #[sea_orm(string_value = "auto_verified")]
    AutoVerified,
    #[sea_orm(string_value = "auto_partially_verified")]
    AutoPartiallyVerified,
    #[sea_orm(string_value = "auto_rejected")]
    AutoRejected,
    #[sea_orm(string_value = "manual_review")]
    ManualReview,
    #[sea_orm(string_value = "manually_verified")]
    ManuallyVerified,
    #[sea_orm(string_value = "manually_partially_verified")]
    ManuallyPartiallyVerified,
    #[sea_orm(string_value = "manually_rejected")]
    ManuallyRejected,
    #[sea_orm(string_value = "auto_rejected_late_submission")]
    AutoRejectedLateSubmission,
}

impl ReceiptVerificationStatus {
    /// Statuses whose `final_cashback` is credited to the user's balance.
    pub const QUALIFYING: [Self; 4] = [
        Self::AutoVerified,
        Self::ManuallyVerified,
        Self::AutoPartiallyVerified,
        Self::ManuallyPartiallyVerified,
    ];

    /// Whether the receipt's cashback counts towards the balance.
    #[must_use]
    pub fn is_qualifying(self) -> bool {
        Self::QUALIFYING.contains(&self)
    }
}

/// Lifecycle of a payout (cashback withdrawal) request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum CashbackRequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "manual_review")]
    ManualReview,
}

/// Discriminator for the two receipt item shapes stored in `receipt_items`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Line item without a cashback claim
    #[sea_orm(string_value = "product_claim")]
    ProductClaim,
    /// Line item claimed for cashback against a product
    #[sea_orm(string_value = "cashback_item")]
    CashbackItem,
}
