//! Product alias entity - Alternative names for a product awaiting or past a decision.
//!
//! `normalized_name` is the lowercased alternative name; together with `product_id` it is
//! unique, so two submissions racing to mint the same alias end up sharing one row.

use super::sea_orm_active_enums::AliasStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product alias database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_aliases")]
pub struct Model {
    /// Unique identifier for the alias
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning product
    pub product_id: i64,
    /// The name as it appeared on the receipt
    pub alternative_name: String,
    /// Lowercased `alternative_name`, used for matching and uniqueness
    pub normalized_name: String,
    /// Decision state
    pub verification_status: AliasStatus,
    /// When the alias was minted
    pub created_at: DateTimeUtc,
    /// When the alias was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between ProductAlias and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each alias belongs to one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Cascade"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
