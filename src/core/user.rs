//! User accounts.
//!
//! Users own receipts and cashback requests. Their `balance` column is maintained by
//! [`crate::core::balance`] and never written here after creation.

use crate::{
    entities::{User, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, SqlErr, prelude::*};
use tracing::info;

/// Creates a user with a zero balance.
///
/// # Errors
/// Returns an error if the username is empty or already taken, or the insert fails.
pub async fn create_user(db: &DatabaseConnection, username: String) -> Result<user::Model> {
    let username = username.trim().to_string();
    if username.is_empty() {
        return Err(Error::Config {
            message: "Username cannot be empty".to_string(),
        });
    }

    let now = Utc::now();
    let user = user::ActiveModel {
        username: Set(username.clone()),
        balance: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match user.insert(db).await {
        Ok(user) => {
            info!("Created user {} '{}'", user.id, user.username);
            Ok(user)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(Error::Config {
                message: format!("Username '{username}' is already taken"),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Retrieves a specific user by its unique ID.
///
/// # Errors
/// Returns an error if the database query fails.
pub async fn get_user_by_id(db: &DatabaseConnection, user_id: i64) -> Result<Option<user::Model>> {
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_user_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let result = create_user(&db, "  ".to_string()).await;
        assert!(matches!(result.unwrap_err(), Error::Config { message: _ }));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_get_user() -> Result<()> {
        let db = setup_test_db().await?;

        let user = create_user(&db, " alice ".to_string()).await?;
        assert_eq!(user.username, "alice");
        assert_eq!(user.balance, 0);

        assert_eq!(get_user_by_id(&db, user.id).await?, Some(user));
        assert!(get_user_by_id(&db, 999).await?.is_none());

        let taken = create_user(&db, "alice".to_string()).await;
        assert!(matches!(taken, Err(Error::Config { .. })));

        Ok(())
    }
}
