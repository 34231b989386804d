//! Receipt entity - One submitted fiscal receipt.
//!
//! `qr_data` and `fiscal_id` are both unique; the database constraint is what makes
//! duplicate submission impossible, not the existence checks done before inserting.
//! `version` is bumped on every status rewrite and guards optimistic updates.

use super::sea_orm_active_enums::ReceiptVerificationStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Receipt database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipts")]
pub struct Model {
    /// Unique identifier for the receipt
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Transaction id assigned by the fiscal data operator
    pub transaction_id: String,
    /// Submitted QR payload or URL, as received
    #[sea_orm(unique)]
    pub qr_data: String,
    /// Fiscal id of the ticket
    #[sea_orm(unique)]
    pub fiscal_id: String,
    /// Submitting user
    pub user_id: i64,
    /// When the purchase happened
    pub date: DateTimeUtc,
    /// Ticket total in minor units
    pub total_amount: i64,
    /// Sum of all tax lines in minor units
    pub tax_amount: i64,
    /// Rate of the first tax line
    pub tax_rate: f64,
    /// Cash register code at the tax authority
    pub kkt_code: String,
    /// Cash register serial number
    pub kkt_serial_number: String,
    /// Payment type reported by the ticket, if any
    pub payment_method: Option<String>,
    /// Aggregated verification state
    pub verification_status: ReceiptVerificationStatus,
    /// Sum of cashback over verified items, in minor units
    pub final_cashback: i64,
    /// Optimistic concurrency counter
    pub version: i32,
    /// When the receipt was submitted
    pub created_at: DateTimeUtc,
    /// When the receipt was last re-evaluated
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Receipt and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each receipt belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    /// One receipt owns many items
    #[sea_orm(has_many = "super::receipt_item::Entity")]
    Items,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::receipt_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
