//! Receipt item entity - Flattened storage for both receipt item shapes.
//!
//! `kind` says which shape the row holds. Product-claim rows leave the cashback columns
//! empty; cashback rows always carry `claimed_product_id`, `verification_status` and
//! `cashback`. `product_alias_id` is a plain reference used for lookup (and indexed for
//! alias propagation), never ownership.

use super::sea_orm_active_enums::{ItemKind, ItemVerificationStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Receipt item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipt_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning receipt
    pub receipt_id: i64,
    /// Zero-based position of the line on the receipt
    pub position: i32,
    pub kind: ItemKind,
    /// Line-item name as printed on the receipt
    pub name: String,
    pub department: String,
    /// Unit price in minor units
    pub unit_price: i64,
    pub quantity: i32,
    pub measure_unit: String,
    /// Line total in minor units
    pub total_price: i64,
    pub claimed_product_id: Option<i64>,
    pub product_alias_id: Option<i64>,
    pub verification_status: Option<ItemVerificationStatus>,
    /// Cashback fixed at match time, in minor units
    pub cashback: Option<i64>,
}

/// Defines relationships between ReceiptItem and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one receipt and is deleted with it
    #[sea_orm(
        belongs_to = "super::receipt::Entity",
        from = "Column::ReceiptId",
        to = "super::receipt::Column::Id",
        on_delete = "Cascade"
    )]
    Receipt,
    /// Claimed product of a cashback item
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ClaimedProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    /// Alias used for the match, if any
    #[sea_orm(
        belongs_to = "super::product_alias::Entity",
        from = "Column::ProductAliasId",
        to = "super::product_alias::Column::Id"
    )]
    ProductAlias,
}

impl Related<super::receipt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receipt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
