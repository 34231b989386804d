use dotenvy::dotenv;
use receipt_cashback::{
    config::{database, settings},
    core::balance,
    errors::Result,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal: env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load promotion and fiscal service settings
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!(
        "Receipts are valid for {} days; fiscal endpoint {}",
        settings.promo.receipt_valid_days(),
        settings.fiscal.endpoint
    );

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Reconcile balances left stale by failed refreshes
    let report = balance::reconcile_all_balances(&db).await?;
    for update in &report.corrected {
        info!(
            "User {} balance corrected from {} to {}",
            update.user_id, update.old_balance, update.new_balance
        );
    }
    for (user_id, err) in &report.failed {
        warn!("User {} could not be reconciled: {}", user_id, err);
    }

    Ok(())
}
