//! In-memory invoice store.
//!
//! Backs local development and the integration test suite; honors the same
//! uniqueness and compare-and-swap contract as the PostgreSQL store.

use async_trait::async_trait;
use chrono::Utc;
use facturacion_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;

use super::InvoiceStore;
use crate::models::{
    AuthorityStamp, Customer, EventType, Invoice, InvoiceEvent, InvoiceItem, InvoiceRef,
    InvoiceStatus, NewEvent, NewInvoice, NewItem, Organization,
};

#[derive(Default)]
struct Inner {
    invoices: HashMap<i64, Invoice>,
    items: HashMap<i64, Vec<InvoiceItem>>,
    events: Vec<InvoiceEvent>,
    customers: HashMap<i64, Customer>,
    organization: Option<Organization>,
    next_invoice_id: i64,
    next_item_id: i64,
    next_event_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_customer(&self, customer: Customer) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.customers.insert(customer.customer_id, customer);
    }

    pub fn set_organization(&self, organization: Organization) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.organization = Some(organization);
    }
}

fn push_event(inner: &mut Inner, event: NewEvent) -> InvoiceEvent {
    inner.next_event_id += 1;
    let stored = InvoiceEvent {
        event_id: inner.next_event_id,
        invoice_id: event.invoice_id,
        event_type: event.event_type,
        payload: event.payload,
        status: event.status,
        created_at: Utc::now(),
    };
    inner.events.push(stored.clone());
    stored
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewItem>,
        event_payload: serde_json::Value,
    ) -> Result<Invoice, AppError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        if inner
            .invoices
            .values()
            .any(|i| i.series == invoice.series && i.number == invoice.number)
        {
            return Err(AppError::Duplicate(format!(
                "Invoice {}-{} already exists",
                invoice.series, invoice.number
            )));
        }

        inner.next_invoice_id += 1;
        let invoice_id = inner.next_invoice_id;
        let now = Utc::now();

        let created = Invoice {
            invoice_id,
            customer_id: invoice.customer_id,
            series: invoice.series,
            number: invoice.number,
            issue_date: invoice.issue_date,
            issue_time: invoice.issue_time,
            currency: invoice.currency,
            exchange_rate: invoice.exchange_rate,
            operation_type: invoice.operation_type,
            line_extension_amount: invoice.line_extension_amount,
            tax_exclusive_amount: invoice.tax_exclusive_amount,
            tax_inclusive_amount: invoice.tax_inclusive_amount,
            allowance_total_amount: invoice.allowance_total_amount,
            charge_total_amount: invoice.charge_total_amount,
            payable_amount: invoice.payable_amount,
            tax_amount: invoice.tax_amount,
            tax_rate: invoice.tax_rate,
            status: InvoiceStatus::Draft,
            cufe: None,
            dian_uuid: None,
            xml_url: None,
            pdf_url: None,
            notes: invoice.notes,
            created_at: now,
            updated_at: now,
        };

        let stored_items = items
            .into_iter()
            .map(|item| {
                inner.next_item_id += 1;
                InvoiceItem {
                    item_row_id: inner.next_item_id,
                    invoice_id,
                    item_id: item.item_id,
                    description: item.description,
                    quantity: item.quantity,
                    unit_measure: item.unit_measure,
                    unit_price: item.unit_price,
                    discount_pct: item.discount_pct,
                    discount_amount: item.discount_amount,
                    tax_rate: item.tax_rate,
                    tax_amount: item.tax_amount,
                    line_subtotal: item.line_subtotal,
                    line_total: item.line_total,
                    product_code: item.product_code,
                    notes: item.notes,
                    created_at: now,
                }
            })
            .collect();

        inner.invoices.insert(invoice_id, created.clone());
        inner.items.insert(invoice_id, stored_items);
        push_event(
            &mut inner,
            NewEvent::completed(invoice_id, EventType::InvoiceCreated, event_payload),
        );

        Ok(created)
    }

    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.invoices.get(&invoice_id).cloned())
    }

    async fn find_invoice(&self, reference: &InvoiceRef) -> Result<Option<Invoice>, AppError> {
        let inner = self.inner.lock().expect("store lock poisoned");

        if let Some(cufe) = &reference.cufe {
            if let Some(found) = inner
                .invoices
                .values()
                .find(|i| i.cufe.as_deref() == Some(cufe.as_str()))
            {
                return Ok(Some(found.clone()));
            }
        }
        if let Some(invoice_id) = reference.invoice_id {
            if let Some(found) = inner.invoices.get(&invoice_id) {
                return Ok(Some(found.clone()));
            }
        }
        if let Some(dian_uuid) = &reference.dian_uuid {
            if let Some(found) = inner
                .invoices
                .values()
                .find(|i| i.dian_uuid.as_deref() == Some(dian_uuid.as_str()))
            {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    }

    async fn get_items(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, AppError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.items.get(&invoice_id).cloned().unwrap_or_default())
    }

    async fn append_event(&self, event: NewEvent) -> Result<InvoiceEvent, AppError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Ok(push_event(&mut inner, event))
    }

    async fn list_events(&self, invoice_id: i64) -> Result<Vec<InvoiceEvent>, AppError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut events: Vec<InvoiceEvent> = inner
            .events
            .iter()
            .filter(|e| e.invoice_id == invoice_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.event_id.cmp(&a.event_id));
        Ok(events)
    }

    async fn transition_status(
        &self,
        invoice_id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
        stamp: Option<&AuthorityStamp>,
        event: NewEvent,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let applied = match inner.invoices.get_mut(&invoice_id) {
            Some(invoice) if invoice.status == from => {
                invoice.status = to;
                if let Some(stamp) = stamp {
                    if stamp.cufe.is_some() {
                        invoice.cufe = stamp.cufe.clone();
                    }
                    if stamp.dian_uuid.is_some() {
                        invoice.dian_uuid = stamp.dian_uuid.clone();
                    }
                }
                invoice.updated_at = Utc::now();
                true
            }
            _ => false,
        };

        if applied {
            push_event(&mut inner, event);
        }

        Ok(applied)
    }

    async fn set_xml_url(&self, invoice_id: i64, url: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if let Some(invoice) = inner.invoices.get_mut(&invoice_id) {
            invoice.xml_url = Some(url.to_string());
            invoice.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_pdf_url(&self, invoice_id: i64, url: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if let Some(invoice) = inner.invoices.get_mut(&invoice_id) {
            invoice.pdf_url = Some(url.to_string());
            invoice.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.customers.get(&customer_id).cloned())
    }

    async fn get_organization(&self) -> Result<Option<Organization>, AppError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.organization.clone())
    }
}
