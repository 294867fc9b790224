//! Invoice model for facturacion-service.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of an electronic invoice.
///
/// `Accepted` and `Rejected` are terminal for a given attempt; a rejected
/// invoice is retried by issuing a fresh one, never by rewriting history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Accepted => "ACCEPTED",
            InvoiceStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Accepted | InvoiceStatus::Rejected)
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "SENT" => Ok(InvoiceStatus::Sent),
            "ACCEPTED" => Ok(InvoiceStatus::Accepted),
            "REJECTED" => Ok(InvoiceStatus::Rejected),
            other => Err(format!("unknown invoice status '{other}'")),
        }
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: i64,
    pub customer_id: i64,
    pub series: String,
    pub number: String,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub operation_type: String,
    pub line_extension_amount: Decimal,
    pub tax_exclusive_amount: Decimal,
    pub tax_inclusive_amount: Decimal,
    pub allowance_total_amount: Decimal,
    pub charge_total_amount: Decimal,
    pub payable_amount: Decimal,
    pub tax_amount: Decimal,
    pub tax_rate: Decimal,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub cufe: Option<String>,
    pub dian_uuid: Option<String>,
    pub xml_url: Option<String>,
    pub pdf_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for persisting a new invoice in DRAFT.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_id: i64,
    pub series: String,
    pub number: String,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub operation_type: String,
    pub line_extension_amount: Decimal,
    pub tax_exclusive_amount: Decimal,
    pub tax_inclusive_amount: Decimal,
    pub allowance_total_amount: Decimal,
    pub charge_total_amount: Decimal,
    pub payable_amount: Decimal,
    pub tax_amount: Decimal,
    pub tax_rate: Decimal,
    pub notes: Option<String>,
}

/// Identifiers assigned by the tax authority on acceptance.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorityStamp {
    pub cufe: Option<String>,
    pub dian_uuid: Option<String>,
}

/// Alternate lookup keys for an invoice, in resolution order:
/// `cufe`, then internal id, then authority uuid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub cufe: Option<String>,
    pub invoice_id: Option<i64>,
    pub dian_uuid: Option<String>,
}

impl InvoiceRef {
    pub fn by_id(invoice_id: i64) -> Self {
        Self {
            invoice_id: Some(invoice_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cufe.is_none() && self.invoice_id.is_none() && self.dian_uuid.is_none()
    }
}
