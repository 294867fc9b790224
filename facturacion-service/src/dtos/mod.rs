//! Request/response bodies for the HTTP interface.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Invoice, InvoiceEvent, InvoiceItem, InvoiceRef, InvoiceStatus};

fn default_currency() -> String {
    "COP".to_string()
}

fn default_exchange_rate() -> Decimal {
    Decimal::ONE
}

fn default_operation_type() -> String {
    "10".to_string()
}

fn default_unit_measure() -> String {
    "94".to_string()
}

fn default_tax_rate() -> Decimal {
    Decimal::new(19, 0)
}

/// Invoice creation request. Required fields are validated explicitly so the
/// response names the first missing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: Option<i64>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub issue_time: Option<NaiveTime>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: Decimal,
    #[serde(default = "default_operation_type")]
    pub operation_type: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<CreateInvoiceItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceItem {
    pub item_id: i64,
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    #[serde(default = "default_unit_measure")]
    pub unit_measure: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_pct: Decimal,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub invoice_id: i64,
    pub series: String,
    pub number: String,
    pub status: InvoiceStatus,
    pub cufe: Option<String>,
    pub dian_uuid: Option<String>,
}

impl From<Invoice> for IssueResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            series: invoice.series,
            number: invoice.number,
            status: invoice.status,
            cufe: invoice.cufe,
            dian_uuid: invoice.dian_uuid,
        }
    }
}

/// Query parameters for the status lookup endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQueryParams {
    pub invoice_id: Option<i64>,
    pub cufe: Option<String>,
    pub dian_uuid: Option<String>,
}

impl StatusQueryParams {
    pub fn into_ref(self) -> InvoiceRef {
        InvoiceRef {
            cufe: self.cufe,
            invoice_id: self.invoice_id,
            dian_uuid: self.dian_uuid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceStatusResponse {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub events: Vec<InvoiceEvent>,
}

#[derive(Debug, Deserialize)]
pub struct PollStatusRequest {
    pub invoice_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PollStatusResponse {
    pub invoice_id: i64,
    pub status: InvoiceStatus,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Asynchronous status callbacks, tagged by `type`. Unknown tags are
/// rejected before any lookup happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebhookEvent {
    InvoiceAccepted {
        #[serde(flatten)]
        reference: InvoiceRef,
        #[serde(default)]
        response_xml: Option<String>,
    },
    InvoiceRejected {
        #[serde(flatten)]
        reference: InvoiceRef,
        #[serde(default)]
        errors: Option<Vec<String>>,
        #[serde(default)]
        response_xml: Option<String>,
    },
    InvoicePending {
        #[serde(flatten)]
        reference: InvoiceRef,
    },
    StatusUpdate {
        #[serde(flatten)]
        reference: InvoiceRef,
        new_status: InvoiceStatus,
        #[serde(default)]
        message: Option<String>,
    },
}

impl WebhookEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            WebhookEvent::InvoiceAccepted { .. } => "invoice_accepted",
            WebhookEvent::InvoiceRejected { .. } => "invoice_rejected",
            WebhookEvent::InvoicePending { .. } => "invoice_pending",
            WebhookEvent::StatusUpdate { .. } => "status_update",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub invoice_id: i64,
    pub status: InvoiceStatus,
    pub applied: bool,
}

#[derive(Debug, Serialize)]
pub struct PdfResponse {
    pub invoice_id: i64,
    pub pdf_url: String,
}
