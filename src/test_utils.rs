//! Shared test utilities for the reconciliation engine.
//!
//! This module provides common helper functions for setting up test databases, creating
//! test entities with sensible defaults, and faking the fiscal ticket service.

use crate::{
    config::settings::Settings,
    core::{alias, fiscal::FiscalTicketSource, product, receipt::ReceiptSubmission, user},
    entities::{self, ReceiptVerificationStatus},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Url;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transaction date every [`TicketBuilder`] ticket carries unless overridden.
pub const TICKET_DATE: &str = "2024-05-01T12:00:00";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output to the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Default settings, as if no config file was present.
#[must_use]
pub fn test_settings() -> Settings {
    Settings::default()
}

/// A moment one day after [`TICKET_DATE`], well inside the default validity window.
#[must_use]
pub fn ticket_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Creates a test user with a zero balance.
pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> Result<entities::UserModel> {
    user::create_user(db, username.to_string()).await
}

/// Creates a test product with sensible defaults.
///
/// # Defaults
/// * `cashback_eligible`: true
/// * `published`: true
/// * `unpublish_date`: None
pub async fn create_test_product(
    db: &DatabaseConnection,
    name: &str,
    cashback_amount: i64,
) -> Result<entities::ProductModel> {
    product::create_product(db, name.to_string(), cashback_amount, true, true, None).await
}

/// Creates an `unverified` alias for a product.
pub async fn create_test_alias(
    db: &DatabaseConnection,
    product_id: i64,
    name: &str,
) -> Result<entities::ProductAliasModel> {
    alias::create_alias(db, product_id, name).await
}

/// Inserts a receipt row directly, without items and without touching the balance.
pub async fn insert_test_receipt(
    db: &DatabaseConnection,
    user_id: i64,
    fiscal_id: &str,
    status: ReceiptVerificationStatus,
    final_cashback: i64,
) -> Result<entities::ReceiptModel> {
    let now = ticket_now();
    let receipt = entities::receipt::ActiveModel {
        transaction_id: Set(format!("tx-{fiscal_id}")),
        qr_data: Set(format!("qr-{fiscal_id}")),
        fiscal_id: Set(fiscal_id.to_string()),
        user_id: Set(user_id),
        date: Set(now),
        total_amount: Set(final_cashback),
        tax_amount: Set(0),
        tax_rate: Set(0.0),
        kkt_code: Set("010101".to_string()),
        kkt_serial_number: Set("SN-42".to_string()),
        payment_method: Set(None),
        verification_status: Set(status),
        final_cashback: Set(final_cashback),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    receipt.insert(db).await.map_err(Into::into)
}

/// Builds a submission whose QR payload is unique per `seq`.
#[must_use]
pub fn submission(user_id: i64, seq: u32, claims: &[(&str, i64)]) -> ReceiptSubmission {
    ReceiptSubmission {
        qr_data: format!("i={seq}&f=600123&s=1300.00&t=20240501T120000"),
        claims: claims
            .iter()
            .map(|(name, product_id)| ((*name).to_string(), *product_id))
            .collect(),
        user_id,
    }
}

/// Builder for fiscal ticket payloads in the shape the ticket service returns.
///
/// The ticket total is the sum of the added items, so built tickets are consistent unless
/// a test edits them afterwards.
#[derive(Debug, Clone)]
pub struct TicketBuilder {
    fiscal_id: String,
    date: String,
    items: Vec<Value>,
    total: i64,
}

impl TicketBuilder {
    /// Starts a ticket with no items.
    #[must_use]
    pub fn new(fiscal_id: &str) -> Self {
        Self {
            fiscal_id: fiscal_id.to_string(),
            date: TICKET_DATE.to_string(),
            items: Vec::new(),
            total: 0,
        }
    }

    /// Adds a line sold in pieces.
    #[must_use]
    pub fn item(mut self, name: &str, unit_price: i64, quantity: i64) -> Self {
        let sum = unit_price * quantity;
        self.items.push(json!({
            "commodity": {
                "name": name,
                "sectionCode": 1,
                "price": unit_price,
                "quantity": quantity,
                "measureUnitCode": "796",
                "sum": sum,
            }
        }));
        self.total += sum;
        self
    }

    /// Overrides the transaction date.
    #[must_use]
    pub fn date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    /// Produces the payload.
    #[must_use]
    pub fn build(self) -> Value {
        json!({
            "ticket": {
                "transactionId": format!("tx-{}", self.fiscal_id),
                "fiscalId": self.fiscal_id,
                "transactionDate": self.date,
                "totalSum": self.total,
                "payments": [{ "paymentType": "PAYMENT_CARD", "sum": self.total }],
                "items": self.items,
            },
            "taxes": [{ "rate": 12.0, "sum": 156 }],
            "kkmFnsId": "010101",
            "kkmSerialNumber": "SN-42",
            "measureUnits": { "796": "pcs" },
        })
    }
}

/// [`FiscalTicketSource`] that answers every lookup with a canned payload.
#[derive(Debug)]
pub struct StubFiscalSource {
    response: Option<Value>,
    requests: AtomicUsize,
}

impl StubFiscalSource {
    /// A source that always returns `payload`.
    #[must_use]
    pub const fn new(payload: Value) -> Self {
        Self {
            response: Some(payload),
            requests: AtomicUsize::new(0),
        }
    }

    /// A source whose service is down.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            response: None,
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of lookups made so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FiscalTicketSource for StubFiscalSource {
    async fn fetch_ticket(&self, _url: &Url) -> Result<Value> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .ok_or_else(|| Error::UpstreamUnavailable {
                message: "stub service is offline".to_string(),
            })
    }
}
