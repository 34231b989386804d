//! Balance calculator
//!
//! A user's balance is always recomputed from scratch: the cashback of their qualifying
//! receipts minus their approved cashback requests. It may go negative; nothing here
//! prevents that.
//!
//! Mutations refresh the balance through [`refresh_balance_after_mutation`], which only logs
//! on failure. [`reconcile_all_balances`] is the sweep that catches whatever those missed.

use crate::{
    entities::{
        CashbackRequest, CashbackRequestStatus, Receipt, ReceiptVerificationStatus, User,
        cashback_request, receipt, user,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use tracing::{info, instrument, warn};

/// Result of recomputing one user's balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    /// User whose balance was recomputed
    pub user_id: i64,
    /// Balance stored before
    pub old_balance: i64,
    /// Balance stored now
    pub new_balance: i64,
}

/// Result of a reconciliation sweep over every user.
#[derive(Debug)]
pub struct ReconcileReport {
    /// Users whose stored balance was wrong and has been corrected
    pub corrected: Vec<BalanceUpdate>,
    /// Number of users processed successfully
    pub users_processed: usize,
    /// Users whose balance could not be recomputed
    pub failed: Vec<(i64, Error)>,
}

/// Computes a user's balance without storing it.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn calculate_user_balance<C>(conn: &C, user_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    let earned: Vec<i64> = Receipt::find()
        .select_only()
        .column(receipt::Column::FinalCashback)
        .filter(receipt::Column::UserId.eq(user_id))
        .filter(receipt::Column::VerificationStatus.is_in(ReceiptVerificationStatus::QUALIFYING))
        .into_tuple()
        .all(conn)
        .await?;

    let withdrawn: Vec<i64> = CashbackRequest::find()
        .select_only()
        .column(cashback_request::Column::Amount)
        .filter(cashback_request::Column::RequesterId.eq(user_id))
        .filter(cashback_request::Column::VerificationStatus.eq(CashbackRequestStatus::Approved))
        .into_tuple()
        .all(conn)
        .await?;

    Ok(earned.iter().sum::<i64>() - withdrawn.iter().sum::<i64>())
}

/// Recomputes a user's balance and stores it.
///
/// # Errors
/// Returns `UserNotFound` if the user does not exist, or a database error.
#[instrument(skip(db))]
pub async fn recompute_balance(db: &DatabaseConnection, user_id: i64) -> Result<i64> {
    recompute(db, user_id)
        .await
        .map(|update| update.new_balance)
}

async fn recompute(db: &DatabaseConnection, user_id: i64) -> Result<BalanceUpdate> {
    let stored = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::UserNotFound { user_id })?;
    let old_balance = stored.balance;
    let new_balance = calculate_user_balance(db, user_id).await?;

    if new_balance != old_balance {
        let mut active: user::ActiveModel = stored.into();
        active.balance = Set(new_balance);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;
        info!(
            "Balance of user {} changed from {} to {}",
            user_id, old_balance, new_balance
        );
    }

    Ok(BalanceUpdate {
        user_id,
        old_balance,
        new_balance,
    })
}

/// Recomputes a balance after a receipt or request mutation.
///
/// Failures are logged and left for [`reconcile_all_balances`]; the mutation itself has
/// already been committed.
pub async fn refresh_balance_after_mutation(db: &DatabaseConnection, user_id: i64) -> Option<i64> {
    match recompute_balance(db, user_id).await {
        Ok(balance) => Some(balance),
        Err(err) => {
            warn!(
                "Failed to recompute balance for user {}, leaving it for reconciliation: {}",
                user_id, err
            );
            None
        }
    }
}

/// Recomputes the balance of every user.
///
/// # Errors
/// Returns an error only if the user list cannot be loaded; per-user failures are reported
/// in [`ReconcileReport::failed`].
#[instrument(skip(db))]
pub async fn reconcile_all_balances(db: &DatabaseConnection) -> Result<ReconcileReport> {
    let user_ids: Vec<i64> = User::find()
        .select_only()
        .column(user::Column::Id)
        .order_by_asc(user::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    let mut report = ReconcileReport {
        corrected: Vec::new(),
        users_processed: 0,
        failed: Vec::new(),
    };
    for user_id in user_ids {
        match recompute(db, user_id).await {
            Ok(update) => {
                report.users_processed += 1;
                if update.old_balance != update.new_balance {
                    report.corrected.push(update);
                }
            }
            Err(err) => {
                warn!("Failed to reconcile balance for user {}: {}", user_id, err);
                report.failed.push((user_id, err));
            }
        }
    }

    info!(
        "Reconciled {} users: {} corrected, {} failed",
        report.users_processed,
        report.corrected.len(),
        report.failed.len()
    );
    Ok(report)
}
