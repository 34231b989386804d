//! Cashback request entity - A user's request to withdraw accumulated cashback.
//!
//! Only approved requests are debited against the balance.

use super::sea_orm_active_enums::CashbackRequestStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cashback request database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cashback_requests")]
pub struct Model {
    /// Unique identifier for the request
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Requesting user
    pub requester_id: i64,
    /// Requested amount in minor units
    pub amount: i64,
    /// Review state
    pub verification_status: CashbackRequestStatus,
    /// When the request was filed
    pub created_at: DateTimeUtc,
    /// When the request was last reviewed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between CashbackRequest and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each request belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RequesterId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
