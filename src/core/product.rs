//! Product catalog - Handles products and their eligibility for cashback claims.
//!
//! A product is claimable when it is cashback-eligible, published, and not past its
//! unpublish date. The unpublish date itself is still claimable (end-of-day cutoff).
//! The matcher works against a [`Catalog`] of claimed products preloaded with their aliases,
//! built by [`load_claimed_catalog`].

use crate::{
    entities::{Product, ProductAlias, product, product_alias},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::HashMap;
use tracing::{info, warn};

/// A product together with every alias it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub product: product::Model,
    pub aliases: Vec<product_alias::Model>,
}

/// Claimed products keyed by product id.
pub type Catalog = HashMap<i64, CatalogEntry>;

/// Whether `product` can be claimed for cashback on `today`.
#[must_use]
pub fn is_claimable(product: &product::Model, today: NaiveDate) -> bool {
    product.cashback_eligible
        && product.published
        && product.unpublish_date.is_none_or(|cutoff| today <= cutoff)
}

/// Creates a new product, performing input validation.
///
/// # Errors
/// Returns an error if:
/// - The canonical name is empty or whitespace-only
/// - The cashback amount is negative
/// - The database insert operation fails
pub async fn create_product(
    db: &DatabaseConnection,
    canonical_name: String,
    cashback_amount: i64,
    cashback_eligible: bool,
    published: bool,
    unpublish_date: Option<NaiveDate>,
) -> Result<product::Model> {
    if canonical_name.trim().is_empty() {
        return Err(Error::Config {
            message: "Product name cannot be empty".to_string(),
        });
    }

    if cashback_amount < 0 {
        return Err(Error::InvalidAmount {
            amount: cashback_amount,
        });
    }

    let now = chrono::Utc::now().naive_utc();

    let product = product::ActiveModel {
        canonical_name: Set(canonical_name.trim().to_string()),
        cashback_eligible: Set(cashback_eligible),
        cashback_amount: Set(cashback_amount),
        published: Set(published),
        unpublish_date: Set(unpublish_date),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let product = product.insert(db).await?;
    info!(
        "Created product {} '{}' with cashback {}",
        product.id, product.canonical_name, product.cashback_amount
    );
    Ok(product)
}

/// Retrieves a specific product by its unique ID.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_product_by_id(
    db: &DatabaseConnection,
    product_id: i64,
) -> Result<Option<product::Model>> {
    Product::find_by_id(product_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists the products that can be claimed on `today`, each with its aliases, ordered by name.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn list_available_products(
    db: &DatabaseConnection,
    today: NaiveDate,
) -> Result<Vec<CatalogEntry>> {
    let rows = Product::find()
        .filter(product::Column::CashbackEligible.eq(true))
        .filter(product::Column::Published.eq(true))
        .order_by_asc(product::Column::CanonicalName)
        .find_with_related(ProductAlias)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter(|(product, _)| is_claimable(product, today))
        .map(|(product, aliases)| CatalogEntry { product, aliases })
        .collect())
}

/// Loads the claimed products with their aliases.
///
/// # Errors
/// Returns `InvalidProductReference` listing every id that is missing or not claimable on
/// `today`, or a database error.
pub async fn load_claimed_catalog<C>(
    conn: &C,
    product_ids: &[i64],
    today: NaiveDate,
) -> Result<Catalog>
where
    C: ConnectionTrait,
{
    let rows = Product::find()
        .filter(product::Column::Id.is_in(product_ids.iter().copied()))
        .find_with_related(ProductAlias)
        .all(conn)
        .await?;

    let catalog: Catalog = rows
        .into_iter()
        .filter(|(product, _)| is_claimable(product, today))
        .map(|(product, aliases)| (product.id, CatalogEntry { product, aliases }))
        .collect();

    let mut invalid: Vec<i64> = product_ids
        .iter()
        .copied()
        .filter(|id| !catalog.contains_key(id))
        .collect();
    if !invalid.is_empty() {
        invalid.sort_unstable();
        invalid.dedup();
        warn!("Claimed products are not claimable: {:?}", invalid);
        return Err(Error::InvalidProductReference {
            product_ids: invalid,
        });
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_create_product_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_product(&db, "   ".to_string(), 100, true, true, None).await;
        assert!(matches!(result.unwrap_err(), Error::Config { message: _ }));

        let result = create_product(&db, "Milk".to_string(), -1, true, true, None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidAmount { amount: -1 }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_get_product() -> Result<()> {
        let db = setup_test_db().await?;

        let product = create_product(&db, "  Milk 1L ".to_string(), 150, true, true, None).await?;
        assert_eq!(product.canonical_name, "Milk 1L");
        assert_eq!(product.cashback_amount, 150);

        let found = get_product_by_id(&db, product.id).await?.unwrap();
        assert_eq!(found, product);
        assert!(get_product_by_id(&db, 999).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_is_claimable_cutoff() -> Result<()> {
        let db = setup_test_db().await?;
        let cutoff = day(2024, 5, 10);
        let product = create_product(&db, "Milk".to_string(), 150, true, true, Some(cutoff)).await?;

        assert!(is_claimable(&product, day(2024, 5, 9)));
        assert!(is_claimable(&product, cutoff));
        assert!(!is_claimable(&product, day(2024, 5, 11)));

        let hidden = create_product(&db, "Bread".to_string(), 50, true, false, None).await?;
        assert!(!is_claimable(&hidden, cutoff));

        let ineligible = create_product(&db, "Bag".to_string(), 0, false, true, None).await?;
        assert!(!is_claimable(&ineligible, cutoff));

        Ok(())
    }

    #[tokio::test]
    async fn test_list_available_products() -> Result<()> {
        let db = setup_test_db().await?;
        let today = day(2024, 5, 1);

        let yogurt = create_test_product(&db, "Yogurt", 100).await?;
        let apple = create_test_product(&db, "Apple", 50).await?;
        create_product(&db, "Expired".to_string(), 80, true, true, Some(day(2024, 4, 30))).await?;
        create_product(&db, "Draft".to_string(), 80, true, false, None).await?;
        create_test_alias(&db, yogurt.id, "YOGURT 2.5%").await?;

        let available = list_available_products(&db, today).await?;
        let names: Vec<&str> = available
            .iter()
            .map(|entry| entry.product.canonical_name.as_str())
            .collect();
        assert_eq!(names, vec!["Apple", "Yogurt"]);
        assert_eq!(available[0].product.id, apple.id);
        assert_eq!(available[1].aliases.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_load_claimed_catalog_reports_invalid_ids() -> Result<()> {
        let db = setup_test_db().await?;
        let today = day(2024, 5, 1);

        let milk = create_test_product(&db, "Milk", 150).await?;
        let draft = create_product(&db, "Draft".to_string(), 80, true, false, None).await?;

        let catalog = load_claimed_catalog(&db, &[milk.id], today).await?;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[&milk.id].product, milk);

        let result = load_claimed_catalog(&db, &[milk.id, 999, draft.id], today).await;
        match result {
            Err(Error::InvalidProductReference { product_ids }) => {
                assert_eq!(product_ids, vec![draft.id, 999]);
            }
            other => panic!("expected InvalidProductReference, got {other:?}"),
        }

        Ok(())
    }
}
