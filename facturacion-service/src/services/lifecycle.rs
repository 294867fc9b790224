//! Invoice lifecycle state machine.
//!
//! The only code path that writes `status`. Other components request a
//! transition and get back whether it applied; the paired audit event is
//! written atomically with the status change by the store.

use facturacion_core::error::AppError;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::store::InvoiceStore;
use crate::models::{AuthorityStamp, EventType, Invoice, InvoiceStatus, NewEvent};

/// Where a status signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSource {
    Pipeline,
    Webhook,
    Poll,
}

impl TransitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionSource::Pipeline => "pipeline",
            TransitionSource::Webhook => "webhook",
            TransitionSource::Poll => "poll",
        }
    }
}

/// A requested status change plus the audit context recorded with it.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target: InvoiceStatus,
    pub stamp: Option<AuthorityStamp>,
    pub source: TransitionSource,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(InvoiceStatus),
    /// The signal did not change the invoice; the resulting status is the
    /// one currently stored. Still audited.
    NoOp(InvoiceStatus),
}

impl TransitionOutcome {
    pub fn status(&self) -> InvoiceStatus {
        match self {
            TransitionOutcome::Applied(status) | TransitionOutcome::NoOp(status) => *status,
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

pub fn is_legal(from: InvoiceStatus, to: InvoiceStatus) -> bool {
    use InvoiceStatus::*;
    matches!(
        (from, to),
        (Draft, Sent) | (Draft, Accepted) | (Draft, Rejected) | (Sent, Accepted) | (Sent, Rejected)
    )
}

fn event_for(target: InvoiceStatus) -> EventType {
    match target {
        InvoiceStatus::Sent => EventType::InvoiceSentToDian,
        InvoiceStatus::Accepted => EventType::InvoiceAccepted,
        InvoiceStatus::Rejected => EventType::InvoiceRejected,
        InvoiceStatus::Draft => EventType::DianStatusUpdated,
    }
}

fn transition_payload(
    source: TransitionSource,
    applied: bool,
    from: InvoiceStatus,
    to: InvoiceStatus,
    data: &serde_json::Value,
) -> serde_json::Value {
    json!({
        "source": source.as_str(),
        "applied": applied,
        "old_status": from,
        "new_status": to,
        "data": data,
    })
}

async fn audit_noop(
    store: &dyn InvoiceStore,
    invoice_id: i64,
    current: InvoiceStatus,
    request: &TransitionRequest,
) -> Result<TransitionOutcome, AppError> {
    store
        .append_event(NewEvent::completed(
            invoice_id,
            EventType::DianStatusUpdated,
            transition_payload(request.source, false, current, request.target, &request.data),
        ))
        .await?;
    info!(
        invoice_id,
        current = current.as_str(),
        requested = request.target.as_str(),
        source = request.source.as_str(),
        "Status signal recorded without transition"
    );
    Ok(TransitionOutcome::NoOp(current))
}

/// Apply a status signal against the transition table.
///
/// Same-status signals and illegal transitions (including any attempt to
/// move an invoice out of a terminal state) are recorded as audit events and
/// reported as no-ops, never as errors. A lost compare-and-swap race is
/// re-evaluated once against the freshly read status.
#[instrument(skip(store, invoice, request), fields(invoice_id = invoice.invoice_id, target = request.target.as_str()))]
pub async fn apply(
    store: &dyn InvoiceStore,
    invoice: &Invoice,
    request: TransitionRequest,
) -> Result<TransitionOutcome, AppError> {
    let invoice_id = invoice.invoice_id;
    let target = request.target;
    let current = invoice.status;

    if current == target || !is_legal(current, target) {
        return audit_noop(store, invoice_id, current, &request).await;
    }

    let event = NewEvent::completed(
        invoice_id,
        event_for(target),
        transition_payload(request.source, true, current, target, &request.data),
    );

    if store
        .transition_status(invoice_id, current, target, request.stamp.as_ref(), event)
        .await?
    {
        return Ok(TransitionOutcome::Applied(target));
    }

    // A concurrent writer moved the invoice first; decide again from the
    // stored status.
    let fresh = store
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {invoice_id} not found")))?;
    let current = fresh.status;

    if current != target && is_legal(current, target) {
        let event = NewEvent::completed(
            invoice_id,
            event_for(target),
            transition_payload(request.source, true, current, target, &request.data),
        );
        if store
            .transition_status(invoice_id, current, target, request.stamp.as_ref(), event)
            .await?
        {
            return Ok(TransitionOutcome::Applied(target));
        }
    }

    warn!(
        invoice_id,
        current = current.as_str(),
        requested = target.as_str(),
        "Transition lost race; recording as no-op"
    );
    audit_noop(store, invoice_id, current, &request).await
}
