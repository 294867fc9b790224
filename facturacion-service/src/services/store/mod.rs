//! Invoice persistence.
//!
//! The store owns the compare-and-swap semantics the lifecycle component
//! relies on: a status transition only applies when the invoice is still in
//! the expected state, and the paired audit event is written in the same
//! storage operation.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgInvoiceStore;

use async_trait::async_trait;
use facturacion_core::error::AppError;

use crate::models::{
    AuthorityStamp, Customer, Invoice, InvoiceEvent, InvoiceItem, InvoiceRef, InvoiceStatus,
    NewEvent, NewInvoice, NewItem, Organization,
};

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Persist a new invoice with its items in DRAFT, appending the creation
    /// event in the same operation. Fails with `Duplicate` when
    /// `(series, number)` already exists.
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewItem>,
        event_payload: serde_json::Value,
    ) -> Result<Invoice, AppError>;

    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError>;

    /// Resolve an invoice by `cufe`, then internal id, then authority uuid.
    async fn find_invoice(&self, reference: &InvoiceRef) -> Result<Option<Invoice>, AppError>;

    async fn get_items(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, AppError>;

    async fn append_event(&self, event: NewEvent) -> Result<InvoiceEvent, AppError>;

    /// Events for an invoice, most recent first.
    async fn list_events(&self, invoice_id: i64) -> Result<Vec<InvoiceEvent>, AppError>;

    /// Conditioned status update: applies only while the invoice is still in
    /// `from`, writing the paired event atomically. Returns whether the
    /// update took effect; a `false` result means a concurrent writer moved
    /// the invoice first and the caller must re-read and re-decide.
    async fn transition_status(
        &self,
        invoice_id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
        stamp: Option<&AuthorityStamp>,
        event: NewEvent,
    ) -> Result<bool, AppError>;

    async fn set_xml_url(&self, invoice_id: i64, url: &str) -> Result<(), AppError>;

    async fn set_pdf_url(&self, invoice_id: i64, url: &str) -> Result<(), AppError>;

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError>;

    async fn get_organization(&self) -> Result<Option<Organization>, AppError>;
}
