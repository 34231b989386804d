//! Database configuration module.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The composite unique and lookup indexes
//! that entity attributes cannot express are added here as well.

use crate::entities::{
    CashbackRequest, Product, ProductAlias, ProductAliasColumn, Receipt, ReceiptItem,
    ReceiptItemColumn, User,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/receipt_cashback.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, falling back to a
/// local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(&get_database_url())
        .await
        .map_err(Into::into)
}

/// Creates all tables and indexes if they do not exist yet.
///
/// Tables are created parents first so that foreign keys resolve on backends that check
/// them eagerly.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Product).await?;
    create_table(db, &schema, ProductAlias).await?;
    create_table(db, &schema, Receipt).await?;
    create_table(db, &schema, ReceiptItem).await?;
    create_table(db, &schema, CashbackRequest).await?;

    let alias_name_unique = Index::create()
        .name("idx_product_aliases_product_name")
        .table(ProductAlias)
        .col(ProductAliasColumn::ProductId)
        .col(ProductAliasColumn::NormalizedName)
        .unique()
        .if_not_exists()
        .to_owned();
    let item_position_unique = Index::create()
        .name("idx_receipt_items_receipt_position")
        .table(ReceiptItem)
        .col(ReceiptItemColumn::ReceiptId)
        .col(ReceiptItemColumn::Position)
        .unique()
        .if_not_exists()
        .to_owned();
    let item_alias_lookup = Index::create()
        .name("idx_receipt_items_product_alias")
        .table(ReceiptItem)
        .col(ReceiptItemColumn::ProductAliasId)
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&alias_name_unique)).await?;
    db.execute(builder.build(&item_position_unique)).await?;
    db.execute(builder.build(&item_alias_lookup)).await?;

    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;
    Ok(())
}
