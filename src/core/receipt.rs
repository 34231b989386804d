//! Receipt submission - Ties the parser, matcher and state machine together.
//!
//! A submission is checked for duplicates before and after the upstream call, parsed,
//! matched, evaluated, and then written in one database transaction together with any
//! aliases minted on the way. The unique constraints on `qr_data` and `fiscal_id` are the
//! final word on duplicates; the pre-checks only avoid needless upstream calls.

use crate::{
    config::settings::Settings,
    core::{
        balance,
        fiscal::{self, FiscalTicketSource},
        matcher::{self, ClaimMapping},
        product,
        status::{self, Phase},
        user,
    },
    entities::{
        Receipt as ReceiptEntity, ReceiptItem as ReceiptItemEntity, ReceiptVerificationStatus,
        receipt,
    },
    errors::{Error, Result},
    models::{ParsedReceipt, Receipt, ReceiptItem},
};
use chrono::{DateTime, Utc};
use sea_orm::{PaginatorTrait, QueryOrder, Set, SqlErr, TransactionTrait, prelude::*};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// A user's request to register a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSubmission {
    /// QR payload or full ticket-lookup URL
    pub qr_data: String,
    /// Line-item name to claimed product id
    pub claims: HashMap<String, i64>,
    /// Submitting user
    pub user_id: i64,
}

/// Submits a receipt as of now.
///
/// # Errors
/// See [`submit_receipt_at`].
pub async fn submit_receipt<S>(
    db: &DatabaseConnection,
    fiscal: &S,
    settings: &Settings,
    submission: ReceiptSubmission,
) -> Result<Receipt>
where
    S: FiscalTicketSource + ?Sized,
{
    submit_receipt_at(db, fiscal, settings, submission, Utc::now()).await
}

/// Submits a receipt, judging the validity window and product availability at `now`.
///
/// A receipt older than the validity window is stored with every line as a product claim
/// and status `auto_rejected_late_submission`; the claim mapping is ignored in that case.
///
/// # Errors
/// - `UserNotFound` if the submitting user does not exist
/// - `DuplicateSubmission` if the QR data or fiscal id is already stored
/// - Any fiscal parser error
/// - `InvalidClaimMapping`, `InvalidProductReference` or `AliasCreationFailed` on a timely
///   submission
/// - Database errors; nothing is persisted in that case
#[instrument(skip(db, fiscal, settings, submission), fields(user_id = submission.user_id))]
pub async fn submit_receipt_at<S>(
    db: &DatabaseConnection,
    fiscal: &S,
    settings: &Settings,
    submission: ReceiptSubmission,
    now: DateTime<Utc>,
) -> Result<Receipt>
where
    S: FiscalTicketSource + ?Sized,
{
    let ReceiptSubmission {
        qr_data,
        claims,
        user_id,
    } = submission;
    let qr_data = qr_data.trim().to_string();

    if user::get_user_by_id(db, user_id).await?.is_none() {
        return Err(Error::UserNotFound { user_id });
    }

    if receipt_exists(db, receipt::Column::QrData, &qr_data).await? {
        warn!("Duplicate submission of QR data by user {}", user_id);
        return Err(duplicate("qr_data"));
    }

    let parsed = fiscal::fetch_receipt(fiscal, &qr_data, &settings.fiscal.endpoint).await?;

    if receipt_exists(db, receipt::Column::FiscalId, &parsed.fiscal_id).await? {
        warn!(
            "Duplicate submission of fiscal id {} by user {}",
            parsed.fiscal_id, user_id
        );
        return Err(duplicate("fiscal_id"));
    }

    let valid_days = settings.promo.receipt_valid_days();
    let on_time = status::is_within_validity_window(parsed.date, now, valid_days);

    let txn = db.begin().await?;
    let (items, verdict) = if on_time {
        let claims = ClaimMapping::new(claims)?;
        claims.validate_against(&parsed.items)?;
        let mut catalog =
            product::load_claimed_catalog(&txn, &claims.product_ids(), now.date_naive()).await?;
        let items = matcher::match_line_items(&txn, &parsed.items, &claims, &mut catalog).await?;
        let verdict = status::evaluate(
            &items,
            Phase::Submission,
            ReceiptVerificationStatus::ManualReview,
        );
        (items, verdict)
    } else {
        info!(
            "Receipt {} dated {} is older than {} days, rejecting as late",
            parsed.fiscal_id, parsed.date, valid_days
        );
        status::late_submission(&parsed.items)
    };

    let record = new_receipt_row(&parsed, qr_data, user_id, verdict, now)
        .insert(&txn)
        .await
        .map_err(map_insert_error)?;
    insert_items(&txn, record.id, &items).await?;
    txn.commit().await?;

    info!(
        "Stored receipt {} (fiscal id {}) for user {} as {:?} with cashback {}",
        record.id, record.fiscal_id, user_id, record.verification_status, record.final_cashback
    );

    balance::refresh_balance_after_mutation(db, user_id).await;

    Ok(Receipt { record, items })
}

fn duplicate(key: &str) -> Error {
    Error::DuplicateSubmission {
        key: key.to_string(),
    }
}

async fn receipt_exists(
    db: &DatabaseConnection,
    column: receipt::Column,
    value: &str,
) -> Result<bool> {
    let count = ReceiptEntity::find()
        .filter(column.eq(value))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Maps a unique violation on the receipt insert to the key that collided.
fn map_insert_error(err: DbErr) -> Error {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) => {
            warn!("Receipt insert hit a unique constraint: {}", message);
            if message.contains("fiscal_id") {
                duplicate("fiscal_id")
            } else {
                duplicate("qr_data")
            }
        }
        _ => err.into(),
    }
}

fn new_receipt_row(
    parsed: &ParsedReceipt,
    qr_data: String,
    user_id: i64,
    verdict: status::Verdict,
    now: DateTime<Utc>,
) -> receipt::ActiveModel {
    receipt::ActiveModel {
        transaction_id: Set(parsed.transaction_id.clone()),
        qr_data: Set(qr_data),
        fiscal_id: Set(parsed.fiscal_id.clone()),
        user_id: Set(user_id),
        date: Set(parsed.date),
        total_amount: Set(parsed.total_amount),
        tax_amount: Set(parsed.tax_amount),
        tax_rate: Set(parsed.tax_rate),
        kkt_code: Set(parsed.kkt_code.clone()),
        kkt_serial_number: Set(parsed.kkt_serial_number.clone()),
        payment_method: Set(parsed.payment_method.clone()),
        verification_status: Set(verdict.status),
        final_cashback: Set(verdict.final_cashback),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

async fn insert_items<C>(conn: &C, receipt_id: i64, items: &[ReceiptItem]) -> Result<()>
where
    C: ConnectionTrait,
{
    if items.is_empty() {
        return Ok(());
    }

    let rows = items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            i32::try_from(position)
                .map(|position| item.to_active_model(receipt_id, position))
                .map_err(|_| Error::CorruptRecord {
                    message: format!("receipt {receipt_id} has too many items"),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    ReceiptItemEntity::insert_many(rows).exec(conn).await?;
    Ok(())
}

/// Loads a receipt with its items in receipt order.
///
/// # Errors
/// Returns an error if the query fails or a stored item is inconsistent.
pub async fn load_receipt_with_items<C>(conn: &C, receipt_id: i64) -> Result<Option<Receipt>>
where
    C: ConnectionTrait,
{
    let Some((record, rows)) = ReceiptEntity::find_by_id(receipt_id)
        .find_with_related(ReceiptItemEntity)
        .all(conn)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    Receipt::from_rows(record, rows).map(Some)
}

/// Retrieves a receipt by id.
///
/// # Errors
/// Returns `ReceiptNotFound` if no such receipt exists, or a database error.
pub async fn get_receipt_by_id(db: &DatabaseConnection, receipt_id: i64) -> Result<Receipt> {
    load_receipt_with_items(db, receipt_id)
        .await?
        .ok_or(Error::ReceiptNotFound { receipt_id })
}

/// Retrieves every receipt of a user with its items, oldest first.
///
/// # Errors
/// Returns an error if the query fails or a stored item is inconsistent.
pub async fn get_user_receipts(db: &DatabaseConnection, user_id: i64) -> Result<Vec<Receipt>> {
    ReceiptEntity::find()
        .filter(receipt::Column::UserId.eq(user_id))
        .order_by_asc(receipt::Column::Id)
        .find_with_related(ReceiptItemEntity)
        .all(db)
        .await?
        .into_iter()
        .map(|(record, rows)| Receipt::from_rows(record, rows))
        .collect()
}
