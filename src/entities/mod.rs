//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod cashback_request;
pub mod product;
pub mod product_alias;
pub mod receipt;
pub mod receipt_item;
pub mod sea_orm_active_enums;
pub mod user;

// Re-export specific types to avoid conflicts
pub use cashback_request::{
    Column as CashbackRequestColumn, Entity as CashbackRequest, Model as CashbackRequestModel,
};
pub use product::{Column as ProductColumn, Entity as Product, Model as ProductModel};
pub use product_alias::{
    Column as ProductAliasColumn, Entity as ProductAlias, Model as ProductAliasModel,
};
pub use receipt::{Column as ReceiptColumn, Entity as Receipt, Model as ReceiptModel};
pub use receipt_item::{
    Column as ReceiptItemColumn, Entity as ReceiptItem, Model as ReceiptItemModel,
};
pub use sea_orm_active_enums::{
    AliasStatus, CashbackRequestStatus, ItemKind, ItemVerificationStatus,
    ReceiptVerificationStatus,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
