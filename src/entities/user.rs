//! User entity - The account holder receipts and cashback requests belong to.
//!
//! Only the account balance is owned by this engine; identity and authentication live in
//! the surrounding platform.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name, unique across users
    #[sea_orm(unique)]
    pub username: String,
    /// Account balance in minor currency units, recomputed from scratch on every change
    pub balance: i64,
    /// When the user was created
    pub created_at: DateTimeUtc,
    /// When the balance was last written
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user submits many receipts
    #[sea_orm(has_many = "super::receipt::Entity")]
    Receipts,
    /// One user files many cashback requests
    #[sea_orm(has_many = "super::cashback_request::Entity")]
    CashbackRequests,
}

impl Related<super::receipt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receipts.def()
    }
}

impl Related<super::cashback_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CashbackRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
