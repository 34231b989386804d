//! Product/alias matcher - Resolves parsed line items against the claimed products.
//!
//! Names are compared case-insensitively after trimming. Each line yields exactly one
//! [`ReceiptItem`]: a product claim when the user did not claim it, otherwise a cashback item
//! matched by canonical name, by an existing alias, or through a freshly minted alias.

use crate::{
    core::{
        alias::create_alias,
        product::{Catalog, CatalogEntry},
    },
    entities::{AliasStatus, ItemVerificationStatus, product_alias},
    errors::{Error, Result},
    models::{CashbackItem, ParsedLineItem, ProductClaim, ReceiptItem},
};
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Canonical form used for every name comparison.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The user's claim of which receipt lines are which products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMapping {
    by_name: HashMap<String, i64>,
}

impl ClaimMapping {
    /// Builds a mapping from raw line-item names to product ids.
    ///
    /// # Errors
    /// Returns `InvalidClaimMapping` if the mapping is empty, has a blank name, or has two
    /// names differing only by case that point to different products.
    pub fn new<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut by_name = HashMap::new();
        for (name, product_id) in entries {
            let key = normalize_name(name.as_ref());
            if key.is_empty() {
                return Err(Error::InvalidClaimMapping {
                    message: "item names cannot be empty".to_string(),
                });
            }
            match by_name.insert(key.clone(), product_id) {
                Some(previous) if previous != product_id => {
                    return Err(Error::InvalidClaimMapping {
                        message: format!(
                            "'{key}' is claimed as both product {previous} and product {product_id}"
                        ),
                    });
                }
                _ => {}
            }
        }

        if by_name.is_empty() {
            return Err(Error::InvalidClaimMapping {
                message: "no items claimed".to_string(),
            });
        }
        Ok(Self { by_name })
    }

    /// Product claimed for a line-item name, if any.
    #[must_use]
    pub fn product_for(&self, name: &str) -> Option<i64> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    /// Distinct claimed product ids in ascending order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.by_name.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Checks that every claimed name appears on the receipt.
    ///
    /// # Errors
    /// Returns `InvalidClaimMapping` naming the claimed items that are not on the receipt.
    pub fn validate_against(&self, items: &[ParsedLineItem]) -> Result<()> {
        let mut missing: Vec<&str> = self
            .by_name
            .keys()
            .filter(|key| !items.iter().any(|item| normalize_name(&item.name) == **key))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        Err(Error::InvalidClaimMapping {
            message: format!("claimed items not on the receipt: {}", missing.join(", ")),
        })
    }
}

/// How a claimed line relates to its product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPlan<'a> {
    /// The name is the product's canonical name
    Canonical,
    /// The name is a known alternative name
    Alias(&'a product_alias::Model),
    /// The name is new for this product
    NewAlias,
}

/// Decides how `name` matches `entry` without touching storage.
#[must_use]
pub fn plan_item<'a>(name: &str, entry: &'a CatalogEntry) -> MatchPlan<'a> {
    let normalized = normalize_name(name);
    if normalize_name(&entry.product.canonical_name) == normalized {
        return MatchPlan::Canonical;
    }
    entry
        .aliases
        .iter()
        .find(|alias| normalize_name(&alias.alternative_name) == normalized)
        .map_or(MatchPlan::NewAlias, MatchPlan::Alias)
}

/// Item status earned by matching through an alias in the given state.
#[must_use]
pub const fn status_for_alias(status: AliasStatus) -> ItemVerificationStatus {
    match status {
        AliasStatus::Verified => ItemVerificationStatus::AutoVerifiedAlias,
        AliasStatus::Rejected => ItemVerificationStatus::AutoRejectedAlias,
        AliasStatus::Unverified => ItemVerificationStatus::ManualReview,
    }
}

/// Matches every line item, minting aliases for new names through `conn`.
///
/// New aliases are added to `catalog`, so a name repeated on the same receipt reuses the
/// alias minted for its first occurrence.
///
/// # Errors
/// - `InvalidProductReference` if a claimed product is not in `catalog`
/// - `AliasCreationFailed` if a new alias cannot be stored
pub async fn match_line_items<C>(
    conn: &C,
    items: &[ParsedLineItem],
    claims: &ClaimMapping,
    catalog: &mut Catalog,
) -> Result<Vec<ReceiptItem>>
where
    C: ConnectionTrait,
{
    let mut matched = Vec::with_capacity(items.len());

    for line in items {
        let Some(product_id) = claims.product_for(&line.name) else {
            matched.push(ReceiptItem::ProductClaim(ProductClaim {
                name: line.name.clone(),
                props: line.props.clone(),
            }));
            continue;
        };

        let entry = catalog
            .get_mut(&product_id)
            .ok_or_else(|| Error::InvalidProductReference {
                product_ids: vec![product_id],
            })?;

        let (alias_id, status, minted) = match plan_item(&line.name, entry) {
            MatchPlan::Canonical => (None, ItemVerificationStatus::AutoVerifiedCanon, None),
            MatchPlan::Alias(alias) => (
                Some(alias.id),
                status_for_alias(alias.verification_status),
                None,
            ),
            MatchPlan::NewAlias => {
                let alias = create_alias(conn, product_id, &line.name)
                    .await
                    .map_err(|err| match err {
                        Error::AliasCreationFailed { .. } => err,
                        other => Error::AliasCreationFailed {
                            name: line.name.clone(),
                            message: other.to_string(),
                        },
                    })
                    .inspect_err(|err| warn!("{}", err))?;
                (
                    Some(alias.id),
                    status_for_alias(alias.verification_status),
                    Some(alias),
                )
            }
        };
        if let Some(alias) = minted {
            entry.aliases.push(alias);
        }

        debug!(
            "Matched '{}' to product {} as {:?}",
            line.name, product_id, status
        );
        matched.push(ReceiptItem::Cashback(CashbackItem {
            name: line.name.clone(),
            props: line.props.clone(),
            product_id,
            alias_id,
            status,
            cashback: entry.product.cashback_amount,
        }));
    }

    Ok(matched)
}
