//! Product aliases and the alias decision propagator.
//!
//! Aliases are minted by the matcher in the `unverified` state and decided exactly once.
//! A decision is written with a compare-and-swap on the alias status, then cascaded into
//! every receipt still waiting in manual review on that alias. Each receipt is rewritten in
//! its own transaction guarded by `receipts.version`, so a failure on one receipt never
//! blocks the others.

use crate::{
    core::{
        balance,
        matcher::normalize_name,
        receipt::load_receipt_with_items,
        status::{self, Phase, Verdict},
    },
    entities::{
        AliasStatus, ItemVerificationStatus, ProductAlias, Receipt as ReceiptEntity,
        ReceiptItem as ReceiptItemEntity, ReceiptVerificationStatus, product_alias, receipt,
        receipt_item,
    },
    errors::{Error, Result},
    models::{Receipt, ReceiptItem},
};
use chrono::Utc;
use sea_orm::{
    ActiveEnum, DatabaseTransaction, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// Read-modify-write attempts per receipt before giving up.
pub const MAX_PROPAGATION_ATTEMPTS: u32 = 3;

/// Outcome of deciding an alias.
#[derive(Debug)]
pub struct AliasDecision {
    /// The alias after the transition
    pub alias: product_alias::Model,
    /// Receipts that were rewritten, in receipt id order
    pub affected: Vec<Receipt>,
    /// Receipts that could not be rewritten, with the reason
    pub failed: Vec<(i64, Error)>,
}

/// Creates an `unverified` alias for `product_id`, or returns the existing one when the
/// same normalized name was stored concurrently.
///
/// # Errors
/// Returns an error if the name is empty or the database operation fails.
pub async fn create_alias<C>(
    conn: &C,
    product_id: i64,
    alternative_name: &str,
) -> Result<product_alias::Model>
where
    C: ConnectionTrait,
{
    let normalized = normalize_name(alternative_name);
    if normalized.is_empty() {
        return Err(Error::AliasCreationFailed {
            name: alternative_name.to_string(),
            message: "alias name cannot be empty".to_string(),
        });
    }

    let now = Utc::now();
    let alias = product_alias::ActiveModel {
        product_id: Set(product_id),
        alternative_name: Set(alternative_name.trim().to_string()),
        normalized_name: Set(normalized.clone()),
        verification_status: Set(AliasStatus::Unverified),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match alias.insert(conn).await {
        Ok(alias) => {
            info!(
                "Created unverified alias {} '{}' for product {}",
                alias.id, alias.alternative_name, product_id
            );
            Ok(alias)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!(
                "Alias '{}' for product {} already exists, reusing it",
                normalized, product_id
            );
            ProductAlias::find()
                .filter(product_alias::Column::ProductId.eq(product_id))
                .filter(product_alias::Column::NormalizedName.eq(normalized))
                .one(conn)
                .await?
                .ok_or(Error::Database(err))
        }
        Err(err) => Err(err.into()),
    }
}

/// Retrieves a specific alias by its unique ID.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_alias_by_id(
    db: &DatabaseConnection,
    alias_id: i64,
) -> Result<Option<product_alias::Model>> {
    ProductAlias::find_by_id(alias_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves every alias of a product, oldest first.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_aliases_for_product(
    db: &DatabaseConnection,
    product_id: i64,
) -> Result<Vec<product_alias::Model>> {
    ProductAlias::find()
        .filter(product_alias::Column::ProductId.eq(product_id))
        .order_by_asc(product_alias::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Item status a pending item takes when its alias is decided.
const fn decided_item_status(decision: AliasStatus) -> Option<ItemVerificationStatus> {
    match decision {
        AliasStatus::Verified => Some(ItemVerificationStatus::ManuallyVerifiedAlias),
        AliasStatus::Rejected => Some(ItemVerificationStatus::ManuallyRejectedAlias),
        AliasStatus::Unverified => None,
    }
}

/// Rewrites the pending items that reference `alias_id` to reflect `decision`.
///
/// Returns the indices of the items that changed. Items with another alias, or that are
/// no longer pending, are left untouched.
pub fn apply_alias_decision(
    items: &mut [ReceiptItem],
    alias_id: i64,
    decision: AliasStatus,
) -> Vec<usize> {
    let Some(new_status) = decided_item_status(decision) else {
        return Vec::new();
    };

    items
        .iter_mut()
        .enumerate()
        .filter_map(|(index, item)| match item {
            ReceiptItem::Cashback(cashback)
                if cashback.alias_id == Some(alias_id) && cashback.status.is_pending() =>
            {
                cashback.status = new_status;
                Some(index)
            }
            _ => None,
        })
        .collect()
}

/// Moves an alias out of `unverified` and cascades the decision into waiting receipts.
///
/// # Errors
/// - `AliasNotFound` if the alias does not exist
/// - `IllegalAliasTransition` if the alias was already decided or `decision` is not
///   `verified`/`rejected`
/// - Database errors from the transition itself or the candidate lookup
///
/// Failures on individual receipts are reported in [`AliasDecision::failed`].
#[instrument(skip(db))]
pub async fn decide_alias(
    db: &DatabaseConnection,
    alias_id: i64,
    decision: AliasStatus,
) -> Result<AliasDecision> {
    let alias = transition_alias(db, alias_id, decision).await?;
    info!(
        "Alias {} '{}' is now {:?}",
        alias.id, alias.alternative_name, alias.verification_status
    );

    let candidates = find_candidate_receipts(db, alias_id).await?;
    debug!("{} receipts wait on alias {}", candidates.len(), alias_id);

    let mut affected = Vec::new();
    let mut failed = Vec::new();
    for receipt_id in candidates {
        match propagate_to_receipt(db, receipt_id, alias_id, decision).await {
            Ok(Some(receipt)) => affected.push(receipt),
            Ok(None) => debug!("Receipt {} needed no update", receipt_id),
            Err(err) => {
                warn!(
                    "Failed to propagate alias {} decision to receipt {}: {}",
                    alias_id, receipt_id, err
                );
                failed.push((receipt_id, err));
            }
        }
    }

    let users: BTreeSet<i64> = affected.iter().map(|r| r.record.user_id).collect();
    for user_id in users {
        balance::refresh_balance_after_mutation(db, user_id).await;
    }

    info!(
        "Alias {} decision updated {} receipts, {} failed",
        alias_id,
        affected.len(),
        failed.len()
    );
    Ok(AliasDecision {
        alias,
        affected,
        failed,
    })
}

/// Compare-and-swap of the alias status from `unverified` to `decision`.
async fn transition_alias(
    db: &DatabaseConnection,
    alias_id: i64,
    decision: AliasStatus,
) -> Result<product_alias::Model> {
    let current = ProductAlias::find_by_id(alias_id)
        .one(db)
        .await?
        .ok_or(Error::AliasNotFound { alias_id })?;

    if !decision.is_decision() {
        return Err(Error::IllegalAliasTransition {
            alias_id,
            from: current.verification_status,
            to: decision,
        });
    }

    let now = Utc::now();
    let result = ProductAlias::update_many()
        .col_expr(
            product_alias::Column::VerificationStatus,
            Expr::value(decision.to_value()),
        )
        .col_expr(product_alias::Column::UpdatedAt, Expr::value(now))
        .filter(product_alias::Column::Id.eq(alias_id))
        .filter(product_alias::Column::VerificationStatus.eq(AliasStatus::Unverified))
        .exec(db)
        .await?;

    // Whoever lost the swap sees the status the winner wrote.
    let stored = ProductAlias::find_by_id(alias_id)
        .one(db)
        .await?
        .ok_or(Error::AliasNotFound { alias_id })?;
    if result.rows_affected == 0 {
        return Err(Error::IllegalAliasTransition {
            alias_id,
            from: stored.verification_status,
            to: decision,
        });
    }
    Ok(stored)
}

/// Receipts in manual review holding a pending item on `alias_id`.
async fn find_candidate_receipts(db: &DatabaseConnection, alias_id: i64) -> Result<Vec<i64>> {
    ReceiptItemEntity::find()
        .select_only()
        .column(receipt_item::Column::ReceiptId)
        .distinct()
        .inner_join(ReceiptEntity)
        .filter(receipt_item::Column::ProductAliasId.eq(alias_id))
        .filter(receipt_item::Column::VerificationStatus.eq(ItemVerificationStatus::ManualReview))
        .filter(receipt::Column::VerificationStatus.eq(ReceiptVerificationStatus::ManualReview))
        .order_by_asc(receipt_item::Column::ReceiptId)
        .into_tuple::<i64>()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies the decision to one receipt, retrying on concurrent modification.
///
/// Returns the rewritten receipt, or `None` when nothing needed to change.
async fn propagate_to_receipt(
    db: &DatabaseConnection,
    receipt_id: i64,
    alias_id: i64,
    decision: AliasStatus,
) -> Result<Option<Receipt>> {
    with_retries(receipt_id, || try_propagate(db, receipt_id, alias_id, decision)).await
}

/// Runs `attempt_fn` up to [`MAX_PROPAGATION_ATTEMPTS`] times while it reports
/// `ConcurrentModification`. Any other outcome is returned as is.
async fn with_retries<T, F, Fut>(receipt_id: i64, mut attempt_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn().await {
            Err(Error::ConcurrentModification { .. }) if attempt < MAX_PROPAGATION_ATTEMPTS => {
                warn!(
                    "Receipt {} changed during propagation, retrying (attempt {})",
                    receipt_id, attempt
                );
                attempt += 1;
            }
            Err(Error::ConcurrentModification { .. }) => {
                return Err(Error::ConcurrentModification {
                    receipt_id,
                    attempts: attempt,
                });
            }
            other => return other,
        }
    }
}

async fn try_propagate(
    db: &DatabaseConnection,
    receipt_id: i64,
    alias_id: i64,
    decision: AliasStatus,
) -> Result<Option<Receipt>> {
    let txn = db.begin().await?;

    let Receipt { record, mut items } = load_receipt_with_items(&txn, receipt_id)
        .await?
        .ok_or(Error::ReceiptNotFound { receipt_id })?;
    if record.verification_status != ReceiptVerificationStatus::ManualReview {
        return Ok(None);
    }

    let changed = apply_alias_decision(&mut items, alias_id, decision);
    let verdict = status::evaluate(&items, Phase::Review, record.verification_status);
    if changed.is_empty()
        && verdict.status == record.verification_status
        && verdict.final_cashback == record.final_cashback
    {
        return Ok(None);
    }

    let record = save_review(&txn, record, verdict).await?;
    for index in changed {
        let ReceiptItem::Cashback(item) = &items[index] else {
            continue;
        };
        let position = i32::try_from(index).map_err(|_| Error::CorruptRecord {
            message: format!("receipt {receipt_id} has too many items"),
        })?;
        ReceiptItemEntity::update_many()
            .col_expr(
                receipt_item::Column::VerificationStatus,
                Expr::value(item.status.to_value()),
            )
            .filter(receipt_item::Column::ReceiptId.eq(receipt_id))
            .filter(receipt_item::Column::Position.eq(position))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    info!(
        "Receipt {} re-evaluated to {:?} with cashback {}",
        receipt_id, record.verification_status, record.final_cashback
    );
    Ok(Some(Receipt { record, items }))
}

/// Writes a review verdict if the receipt still has the version it was read at.
///
/// # Errors
/// Returns `ConcurrentModification` when the stored version moved on.
async fn save_review(
    txn: &DatabaseTransaction,
    record: receipt::Model,
    verdict: Verdict,
) -> Result<receipt::Model> {
    let now = Utc::now();
    let result = ReceiptEntity::update_many()
        .col_expr(
            receipt::Column::VerificationStatus,
            Expr::value(verdict.status.to_value()),
        )
        .col_expr(
            receipt::Column::FinalCashback,
            Expr::value(verdict.final_cashback),
        )
        .col_expr(receipt::Column::Version, Expr::value(record.version + 1))
        .col_expr(receipt::Column::UpdatedAt, Expr::value(now))
        .filter(receipt::Column::Id.eq(record.id))
        .filter(receipt::Column::Version.eq(record.version))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::ConcurrentModification {
            receipt_id: record.id,
            attempts: 1,
        });
    }

    Ok(receipt::Model {
        verification_status: verdict.status,
        final_cashback: verdict.final_cashback,
        version: record.version + 1,
        updated_at: now,
        ..record
    })
}
