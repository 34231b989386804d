//! Fiscal data parser - Turns a QR payload into a validated [`ParsedReceipt`].
//!
//! The work is split in three steps so each can be tested on its own:
//! [`normalize_reference`] builds the ticket-lookup URL, a [`FiscalTicketSource`] fetches
//! the raw JSON ticket, and [`parse_ticket`] validates and extracts the canonical fields.
//! [`fetch_receipt`] chains the three.
//!
//! Amounts in the ticket are minor currency units and are kept as integers; a fractional or
//! non-finite amount is treated as invalid.

use crate::config::settings::FiscalApiConfig;
use crate::errors::{Error, Result};
use crate::models::{ItemProps, ParsedLineItem, ParsedReceipt};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Query parameters a ticket-lookup URL must carry.
const REQUIRED_PARAMS: [&str; 4] = ["i", "f", "s", "t"];

/// Outbound port to the fiscal ticket service.
#[async_trait]
pub trait FiscalTicketSource: Send + Sync {
    /// Fetches the raw ticket JSON for a normalized lookup URL.
    ///
    /// # Errors
    /// `UpstreamUnavailable` on transport failures, timeouts and error statuses;
    /// `InvalidUpstreamPayload` when the body is not JSON.
    async fn fetch_ticket(&self, url: &Url) -> Result<Value>;
}

/// [`FiscalTicketSource`] backed by a `reqwest` client with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpFiscalClient {
    client: Client,
}

impl HttpFiscalClient {
    /// Creates a client using the configured timeout.
    pub fn new(config: &FiscalApiConfig) -> Result<Self> {
        Self::with_timeout(config.timeout())
    }

    /// Creates a client with an explicit request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build fiscal HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FiscalTicketSource for HttpFiscalClient {
    #[instrument(skip(self, url), fields(url = %url))]
    async fn fetch_ticket(&self, url: &Url) -> Result<Value> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        debug!("Fiscal service responded with status {}", status);
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable {
                message: format!("fiscal service returned status {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("failed to read response body: {e}"),
            })?;

        serde_json::from_str(&body).map_err(|e| Error::InvalidUpstreamPayload {
            message: format!("response is not JSON: {e}"),
        })
    }
}

/// Normalizes a QR payload or URL into the ticket-lookup URL under `endpoint`.
///
/// Input that does not start with `http` is taken to be the query string alone.
pub fn normalize_reference(reference: &str, endpoint: &str) -> Result<Url> {
    let malformed = |reason: String| Error::MalformedReference {
        reference: reference.to_string(),
        reason,
    };

    let reference_trimmed = reference.trim();
    if reference_trimmed.is_empty() {
        return Err(malformed("reference is empty".to_string()));
    }

    let candidate = if reference_trimmed.starts_with("http") {
        reference_trimmed.to_string()
    } else if reference_trimmed.starts_with('?') {
        format!("{endpoint}{reference_trimmed}")
    } else {
        format!("{endpoint}?{reference_trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| malformed(format!("not a valid URL: {e}")))?;
    let expected = Url::parse(endpoint).map_err(|e| Error::Config {
        message: format!("Invalid fiscal endpoint '{endpoint}': {e}"),
    })?;

    if url.scheme() != expected.scheme()
        || url.host_str() != expected.host_str()
        || url.port_or_known_default() != expected.port_or_known_default()
        || url.path().trim_end_matches('/') != expected.path().trim_end_matches('/')
    {
        return Err(malformed(format!("expected a {endpoint} link")));
    }

    for param in REQUIRED_PARAMS {
        let present = url
            .query_pairs()
            .any(|(key, value)| key == param && !value.trim().is_empty());
        if !present {
            return Err(malformed(format!("missing query parameter '{param}'")));
        }
    }

    Ok(url)
}

/// Normalizes `reference`, fetches the ticket through `source`, and parses it.
#[instrument(skip(source))]
pub async fn fetch_receipt<S>(source: &S, reference: &str, endpoint: &str) -> Result<ParsedReceipt>
where
    S: FiscalTicketSource + ?Sized,
{
    let url = normalize_reference(reference, endpoint)?;
    info!("Requesting fiscal ticket from {}", url);
    let payload = source.fetch_ticket(&url).await?;
    let parsed = parse_ticket(&payload)?;
    info!(
        "Parsed fiscal ticket {} with {} items",
        parsed.fiscal_id,
        parsed.items.len()
    );
    Ok(parsed)
}

/// Validates a raw ticket payload and extracts its canonical fields.
///
/// Invalid line items are dropped with a warning. When any items survive, their totals
/// must add up to the ticket total exactly.
pub fn parse_ticket(payload: &Value) -> Result<ParsedReceipt> {
    let ticket = payload
        .get("ticket")
        .filter(|ticket| ticket.is_object())
        .ok_or_else(|| Error::InvalidUpstreamPayload {
            message: "missing ticket".to_string(),
        })?;
    let fiscal_id = ticket
        .get("fiscalId")
        .and_then(text)
        .ok_or_else(|| Error::InvalidUpstreamPayload {
            message: "missing ticket.fiscalId".to_string(),
        })?;

    let transaction_id = ticket
        .get("transactionId")
        .and_then(text)
        .ok_or_else(|| incomplete("ticket.transactionId"))?;

    let date = ticket
        .get("transactionDate")
        .and_then(Value::as_str)
        .and_then(parse_ticket_date)
        .ok_or_else(|| incomplete("ticket.transactionDate"))?;

    let total_amount = ticket
        .get("totalSum")
        .and_then(minor_units)
        .ok_or_else(|| incomplete("ticket.totalSum"))?;

    let (tax_amount, tax_rate) = parse_taxes(payload.get("taxes"))?;

    let kkt_code = payload
        .get("kkmFnsId")
        .and_then(text)
        .ok_or_else(|| incomplete("kkmFnsId"))?;
    let kkt_serial_number = payload
        .get("kkmSerialNumber")
        .and_then(text)
        .ok_or_else(|| incomplete("kkmSerialNumber"))?;

    let payment_method = ticket
        .get("payments")
        .and_then(|payments| payments.get(0))
        .and_then(|payment| payment.get("paymentType"))
        .and_then(text);
    if payment_method.is_none() {
        debug!("No payment method on ticket {}", fiscal_id);
    }

    let measure_units = payload.get("measureUnits");
    let items: Vec<ParsedLineItem> = ticket
        .get("items")
        .and_then(Value::as_array)
        .map(|raw_items| {
            raw_items
                .iter()
                .enumerate()
                .filter_map(|(index, raw)| {
                    let item = parse_line_item(index, raw, measure_units);
                    if item.is_none() {
                        warn!("Dropping invalid item at index {} on ticket {}: {}", index, fiscal_id, raw);
                    }
                    item
                })
                .collect()
        })
        .unwrap_or_default();

    if items.is_empty() {
        info!("No valid items on ticket {}", fiscal_id);
    } else {
        let items_total = items
            .iter()
            .try_fold(0_i64, |total, item| total.checked_add(item.props.total_price))
            .ok_or_else(|| incomplete("ticket.items"))?;
        if items_total != total_amount {
            warn!(
                "Total amount mismatch on ticket {}: items total {} vs ticket total {}",
                fiscal_id, items_total, total_amount
            );
            return Err(Error::TotalsMismatch {
                items_total,
                receipt_total: total_amount,
            });
        }
    }

    Ok(ParsedReceipt {
        transaction_id,
        fiscal_id,
        date,
        total_amount,
        tax_amount,
        tax_rate,
        kkt_code,
        kkt_serial_number,
        payment_method,
        items,
    })
}

fn incomplete(field: &str) -> Error {
    Error::IncompleteReceiptData {
        field: field.to_string(),
    }
}

/// Sums the tax lines and takes the first line's rate. No taxes means zero for both.
fn parse_taxes(taxes: Option<&Value>) -> Result<(i64, f64)> {
    let Some(lines) = taxes.and_then(Value::as_array).filter(|lines| !lines.is_empty()) else {
        return Ok((0, 0.0));
    };

    let mut amount = 0_i64;
    for line in lines {
        match line.get("sum") {
            None | Some(Value::Null) => {}
            Some(sum) => {
                amount = minor_units(sum)
                    .and_then(|sum| amount.checked_add(sum))
                    .ok_or_else(|| incomplete("taxes.sum"))?;
            }
        }
    }

    let rate = match lines[0].get("rate") {
        None | Some(Value::Null) => 0.0,
        Some(rate) => rate
            .as_f64()
            .filter(|rate| rate.is_finite())
            .ok_or_else(|| incomplete("taxes.rate"))?,
    };

    Ok((amount, rate))
}

fn parse_line_item(index: usize, raw: &Value, measure_units: Option<&Value>) -> Option<ParsedLineItem> {
    let empty = Value::Null;
    let commodity = raw.get("commodity").unwrap_or(&empty);

    let name = commodity
        .get("name")
        .and_then(text)
        .unwrap_or_else(|| format!("Unknown_{}", index + 1));
    let department = commodity
        .get("sectionCode")
        .and_then(text)
        .unwrap_or_else(|| "Unknown".to_string());
    let unit_price = amount_or_zero(commodity.get("price"))?;
    let total_price = amount_or_zero(commodity.get("sum"))?;
    let quantity = match commodity.get("quantity") {
        None | Some(Value::Null) => 1,
        Some(quantity) => positive_count(quantity)?,
    };
    let measure_unit = commodity
        .get("measureUnitCode")
        .and_then(text)
        .and_then(|code| measure_units?.get(&code).and_then(text))
        .unwrap_or_else(|| "unit".to_string());

    Some(ParsedLineItem {
        name,
        props: ItemProps {
            department,
            unit_price,
            quantity,
            measure_unit,
            total_price,
        },
    })
}

/// Missing amounts default to zero; present ones must be valid minor units.
fn amount_or_zero(value: Option<&Value>) -> Option<i64> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(value) => minor_units(value),
    }
}

/// Largest magnitude accepted for a single amount. Beyond 2^53 a float no longer holds an
/// exact integer, and integers are held to the same bound.
const MAX_EXACT_UNITS: i64 = 1 << 53;

/// Reads a JSON number as integral minor units.
#[allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
fn minor_units(value: &Value) -> Option<i64> {
    if let Some(units) = value.as_i64() {
        return (1 - MAX_EXACT_UNITS..MAX_EXACT_UNITS).contains(&units).then_some(units);
    }
    let units = value.as_f64()?;
    (units.is_finite() && units.fract() == 0.0 && units.abs() < MAX_EXACT_UNITS as f64)
        .then_some(units as i64)
}

fn positive_count(value: &Value) -> Option<i32> {
    minor_units(value)
        .filter(|count| *count > 0)
        .and_then(|count| i32::try_from(count).ok())
}

/// Reads a non-empty string, or a number rendered as text.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339 timestamps, naive timestamps (taken as UTC) and bare dates.
fn parse_ticket_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
