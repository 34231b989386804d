//! Product entity - Catalog entries that line items can be claimed against.
//!
//! A product is claimable when it is cashback-eligible, published, and not past its
//! unpublish date. Each product owns a set of aliases (alternative names).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Unique identifier for the product
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Authoritative product name; exact (case-insensitive) matches auto-verify
    pub canonical_name: String,
    /// Whether the product pays cashback at all
    pub cashback_eligible: bool,
    /// Cashback paid per claimed line item, in minor currency units
    pub cashback_amount: i64,
    /// Publication status; drafts cannot be claimed
    pub published: bool,
    /// Last day (inclusive) on which the product can be claimed
    pub unpublish_date: Option<Date>,
    /// When the product was created
    pub created_at: DateTime,
    /// When the product was last modified
    pub updated_at: DateTime,
}

/// Defines relationships between Product and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One product owns many aliases
    #[sea_orm(has_many = "super::product_alias::Entity")]
    ProductAliases,
}

impl Related<super::product_alias::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductAliases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
