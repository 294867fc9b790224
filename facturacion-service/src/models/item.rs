//! Invoice line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Line on an invoice. Immutable once the parent invoice leaves DRAFT.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub item_row_id: i64,
    pub invoice_id: i64,
    pub item_id: i64,
    pub description: String,
    pub quantity: Decimal,
    pub unit_measure: String,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_subtotal: Decimal,
    pub line_total: Decimal,
    pub product_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for persisting a line item, amounts already computed and rounded.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_id: i64,
    pub description: String,
    pub quantity: Decimal,
    pub unit_measure: String,
    pub unit_price: Decimal,
    pub discount_pct: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_subtotal: Decimal,
    pub line_total: Decimal,
    pub product_code: Option<String>,
    pub notes: Option<String>,
}
