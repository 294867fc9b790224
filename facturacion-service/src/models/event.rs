//! Append-only invoice event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Event type tag. The event log is the sole source of historical truth for
/// why an invoice is in its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    InvoiceCreated,
    InvoiceSentToDian,
    InvoiceAccepted,
    InvoiceRejected,
    DianStatusUpdated,
    ErrorOccurred,
    PdfGenerated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InvoiceCreated => "INVOICE_CREATED",
            EventType::InvoiceSentToDian => "INVOICE_SENT_TO_DIAN",
            EventType::InvoiceAccepted => "INVOICE_ACCEPTED",
            EventType::InvoiceRejected => "INVOICE_REJECTED",
            EventType::DianStatusUpdated => "DIAN_STATUS_UPDATED",
            EventType::ErrorOccurred => "ERROR_OCCURRED",
            EventType::PdfGenerated => "PDF_GENERATED",
        }
    }
}

impl TryFrom<String> for EventType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "INVOICE_CREATED" => Ok(EventType::InvoiceCreated),
            "INVOICE_SENT_TO_DIAN" => Ok(EventType::InvoiceSentToDian),
            "INVOICE_ACCEPTED" => Ok(EventType::InvoiceAccepted),
            "INVOICE_REJECTED" => Ok(EventType::InvoiceRejected),
            "DIAN_STATUS_UPDATED" => Ok(EventType::DianStatusUpdated),
            "ERROR_OCCURRED" => Ok(EventType::ErrorOccurred),
            "PDF_GENERATED" => Ok(EventType::PdfGenerated),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// Completion status of the operation the event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Completed => "COMPLETED",
            EventStatus::Failed => "FAILED",
        }
    }
}

impl TryFrom<String> for EventStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "COMPLETED" => Ok(EventStatus::Completed),
            "FAILED" => Ok(EventStatus::Failed),
            other => Err(format!("unknown event status '{other}'")),
        }
    }
}

/// Immutable audit fact. Never edited or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceEvent {
    pub event_id: i64,
    pub invoice_id: i64,
    #[sqlx(try_from = "String")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for appending an event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub invoice_id: i64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub status: EventStatus,
}

impl NewEvent {
    pub fn completed(invoice_id: i64, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            invoice_id,
            event_type,
            payload,
            status: EventStatus::Completed,
        }
    }

    pub fn failed(invoice_id: i64, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            invoice_id,
            event_type,
            payload,
            status: EventStatus::Failed,
        }
    }
}
