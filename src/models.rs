//! Domain types that are not tables on their own.
//!
//! [`ParsedReceipt`] is the ephemeral output of the fiscal parser. [`ReceiptItem`] is the
//! two-shape item union a [`Receipt`] owns; it is flattened into `receipt_items` rows for
//! storage and rebuilt from them on load.

use crate::entities::{ItemKind, ItemVerificationStatus, receipt, receipt_item};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fiscal ticket normalized into canonical fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    /// Operator transaction id
    pub transaction_id: String,
    pub fiscal_id: String,
    pub date: DateTime<Utc>,
    /// Ticket total in minor units
    pub total_amount: i64,
    /// Sum of tax lines in minor units
    pub tax_amount: i64,
    pub tax_rate: f64,
    pub kkt_code: String,
    pub kkt_serial_number: String,
    pub payment_method: Option<String>,
    /// Line items in receipt order
    pub items: Vec<ParsedLineItem>,
}

/// One validated line of a fiscal ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLineItem {
    pub name: String,
    pub props: ItemProps,
}

/// Line-item properties shared by both receipt item shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProps {
    pub department: String,
    /// Unit price in minor units
    pub unit_price: i64,
    /// Always positive
    pub quantity: i32,
    pub measure_unit: String,
    /// Line total in minor units
    pub total_price: i64,
}

/// A receipt line as stored on the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiptItem {
    /// Line the user did not claim, or any line of a late submission
    ProductClaim(ProductClaim),
    /// Line claimed for cashback against a product
    Cashback(CashbackItem),
}

/// Unclaimed receipt line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductClaim {
    pub name: String,
    pub props: ItemProps,
}

/// Receipt line claimed for cashback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackItem {
    pub name: String,
    pub props: ItemProps,
    /// Product the user claimed this line as
    pub product_id: i64,
    /// Alias the name was matched through; `None` for canonical matches
    pub alias_id: Option<i64>,
    pub status: ItemVerificationStatus,
    /// Cashback fixed at match time, in minor units
    pub cashback: i64,
}

impl ReceiptItem {
    /// Line-item name as printed on the receipt.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ProductClaim(claim) => &claim.name,
            Self::Cashback(item) => &item.name,
        }
    }

    /// The cashback variant, if this is one.
    #[must_use]
    pub const fn as_cashback(&self) -> Option<&CashbackItem> {
        match self {
            Self::Cashback(item) => Some(item),
            Self::ProductClaim(_) => None,
        }
    }

    /// Builds an unsaved row for this item at `position` on receipt `receipt_id`.
    #[must_use]
    pub fn to_active_model(&self, receipt_id: i64, position: i32) -> receipt_item::ActiveModel {
        use sea_orm::{NotSet, Set};

        let (kind, name, props) = match self {
            Self::ProductClaim(claim) => (ItemKind::ProductClaim, &claim.name, &claim.props),
            Self::Cashback(item) => (ItemKind::CashbackItem, &item.name, &item.props),
        };
        let cashback = self.as_cashback();

        receipt_item::ActiveModel {
            id: NotSet,
            receipt_id: Set(receipt_id),
            position: Set(position),
            kind: Set(kind),
            name: Set(name.clone()),
            department: Set(props.department.clone()),
            unit_price: Set(props.unit_price),
            quantity: Set(props.quantity),
            measure_unit: Set(props.measure_unit.clone()),
            total_price: Set(props.total_price),
            claimed_product_id: Set(cashback.map(|item| item.product_id)),
            product_alias_id: Set(cashback.and_then(|item| item.alias_id)),
            verification_status: Set(cashback.map(|item| item.status)),
            cashback: Set(cashback.map(|item| item.cashback)),
        }
    }
}

impl TryFrom<receipt_item::Model> for ReceiptItem {
    type Error = Error;

    fn try_from(row: receipt_item::Model) -> Result<Self> {
        let props = ItemProps {
            department: row.department,
            unit_price: row.unit_price,
            quantity: row.quantity,
            measure_unit: row.measure_unit,
            total_price: row.total_price,
        };

        match row.kind {
            ItemKind::ProductClaim => Ok(Self::ProductClaim(ProductClaim {
                name: row.name,
                props,
            })),
            ItemKind::CashbackItem => {
                let (Some(product_id), Some(status), Some(cashback)) =
                    (row.claimed_product_id, row.verification_status, row.cashback)
                else {
                    return Err(Error::CorruptRecord {
                        message: format!(
                            "cashback item {} on receipt {} lacks product, status or cashback",
                            row.id, row.receipt_id
                        ),
                    });
                };
                Ok(Self::Cashback(CashbackItem {
                    name: row.name,
                    props,
                    product_id,
                    alias_id: row.product_alias_id,
                    status,
                    cashback,
                }))
            }
        }
    }
}

/// A stored receipt together with its items in receipt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub record: receipt::Model,
    pub items: Vec<ReceiptItem>,
}

impl Receipt {
    /// Assembles a receipt from its row and item rows in any order.
    pub fn from_rows(record: receipt::Model, mut rows: Vec<receipt_item::Model>) -> Result<Self> {
        rows.sort_by_key(|row| row.position);
        let items = rows
            .into_iter()
            .map(ReceiptItem::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { record, items })
    }
}
