//! Cashback requests - Payout requests debited from the user's balance once approved.
//!
//! Requests are created `pending`. Every status change recomputes the requester's balance,
//! since only `approved` requests count against it.

use crate::{
    core::{balance, user},
    entities::{CashbackRequest, CashbackRequestStatus, cashback_request},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, instrument};

/// Creates a pending payout request.
///
/// # Errors
/// Returns an error if:
/// - The amount is zero or negative
/// - The user does not exist
/// - The database insert operation fails
pub async fn create_cashback_request(
    db: &DatabaseConnection,
    user_id: i64,
    amount: i64,
) -> Result<cashback_request::Model> {
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    if user::get_user_by_id(db, user_id).await?.is_none() {
        return Err(Error::UserNotFound { user_id });
    }

    let now = Utc::now();
    let request = cashback_request::ActiveModel {
        requester_id: Set(user_id),
        amount: Set(amount),
        verification_status: Set(CashbackRequestStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let request = request.insert(db).await?;
    info!(
        "User {} requested a payout of {} (request {})",
        user_id, amount, request.id
    );
    Ok(request)
}

/// Moves a request to `status` and recomputes the requester's balance.
///
/// # Errors
/// Returns `CashbackRequestNotFound` if the request does not exist, or a database error.
#[instrument(skip(db))]
pub async fn set_cashback_request_status(
    db: &DatabaseConnection,
    request_id: i64,
    status: CashbackRequestStatus,
) -> Result<cashback_request::Model> {
    let request = CashbackRequest::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or(Error::CashbackRequestNotFound { request_id })?;

    if request.verification_status == status {
        return Ok(request);
    }

    let previous = request.verification_status;
    let mut active: cashback_request::ActiveModel = request.into();
    active.verification_status = Set(status);
    active.updated_at = Set(Utc::now());
    let request = active.update(db).await?;
    info!(
        "Cashback request {} moved from {:?} to {:?}",
        request.id, previous, status
    );

    balance::refresh_balance_after_mutation(db, request.requester_id).await;
    Ok(request)
}

/// Retrieves every request of a user, oldest first.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_user_cashback_requests(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<cashback_request::Model>> {
    CashbackRequest::find()
        .filter(cashback_request::Column::RequesterId.eq(user_id))
        .order_by_asc(cashback_request::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
