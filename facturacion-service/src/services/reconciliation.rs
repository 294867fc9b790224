//! Status reconciliation.
//!
//! Applies webhook callbacks and operator polls against the state machine.
//! Every signal is audited with its source and raw payload, including the
//! ones that change nothing: redelivery of an identical payload must never
//! produce a second status change.

use facturacion_core::error::AppError;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::artifacts::ArtifactStorage;
use super::gateway::{AuthorityVerdict, DianGateway};
use super::lifecycle::{self, TransitionRequest, TransitionSource};
use super::metrics::WEBHOOK_EVENTS_TOTAL;
use super::pipeline::{with_stage_timeout, Stage};
use super::store::InvoiceStore;
use crate::config::Config;
use crate::dtos::WebhookEvent;
use crate::models::{AuthorityStamp, Invoice, InvoiceRef, InvoiceStatus};

/// A normalized status signal, whatever channel it arrived on.
#[derive(Debug, Clone)]
pub struct StatusSignal {
    pub target: InvoiceStatus,
    pub stamp: Option<AuthorityStamp>,
    pub response_xml: Option<String>,
    pub source: TransitionSource,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub invoice_id: i64,
    pub status: InvoiceStatus,
    pub applied: bool,
}

impl WebhookEvent {
    /// Split a webhook into its lookup reference and the signal to apply.
    pub fn into_signal(self, raw: serde_json::Value) -> (InvoiceRef, StatusSignal) {
        match self {
            WebhookEvent::InvoiceAccepted {
                reference,
                response_xml,
            } => {
                let stamp = AuthorityStamp {
                    cufe: reference.cufe.clone(),
                    dian_uuid: reference.dian_uuid.clone(),
                };
                (
                    reference,
                    StatusSignal {
                        target: InvoiceStatus::Accepted,
                        stamp: Some(stamp),
                        response_xml,
                        source: TransitionSource::Webhook,
                        raw,
                    },
                )
            }
            WebhookEvent::InvoiceRejected {
                reference,
                response_xml,
                ..
            } => (
                reference,
                StatusSignal {
                    target: InvoiceStatus::Rejected,
                    stamp: None,
                    response_xml,
                    source: TransitionSource::Webhook,
                    raw,
                },
            ),
            WebhookEvent::InvoicePending { reference } => {
                let stamp = AuthorityStamp {
                    cufe: None,
                    dian_uuid: reference.dian_uuid.clone(),
                };
                (
                    reference,
                    StatusSignal {
                        target: InvoiceStatus::Sent,
                        stamp: Some(stamp),
                        response_xml: None,
                        source: TransitionSource::Webhook,
                        raw,
                    },
                )
            }
            WebhookEvent::StatusUpdate {
                reference,
                new_status,
                ..
            } => (
                reference,
                StatusSignal {
                    target: new_status,
                    stamp: None,
                    response_xml: None,
                    source: TransitionSource::Webhook,
                    raw,
                },
            ),
        }
    }
}

/// Resolve the invoice a signal refers to and apply it.
#[instrument(skip(store, artifacts, signal))]
pub async fn reconcile(
    store: &dyn InvoiceStore,
    artifacts: &dyn ArtifactStorage,
    reference: &InvoiceRef,
    signal: StatusSignal,
) -> Result<ReconcileOutcome, AppError> {
    if reference.is_empty() {
        return Err(AppError::Validation(
            "cufe, invoice_id or dian_uuid is required".to_string(),
        ));
    }

    let invoice = store
        .find_invoice(reference)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))?;

    apply_signal(store, artifacts, &invoice, signal).await
}

/// Apply an already-resolved signal through the state machine.
pub async fn apply_signal(
    store: &dyn InvoiceStore,
    artifacts: &dyn ArtifactStorage,
    invoice: &Invoice,
    signal: StatusSignal,
) -> Result<ReconcileOutcome, AppError> {
    if let Some(xml) = &signal.response_xml {
        let key = format!("responses/{}-{}.xml", invoice.invoice_id, Uuid::new_v4());
        match artifacts.store(&key, xml.clone().into_bytes()).await {
            Ok(url) => {
                if signal.target == InvoiceStatus::Accepted {
                    if let Err(err) = store.set_xml_url(invoice.invoice_id, &url).await {
                        warn!(invoice_id = invoice.invoice_id, error = %err, "Failed to record xml_url");
                    }
                }
            }
            Err(err) => {
                warn!(invoice_id = invoice.invoice_id, error = %err, "Failed to store response XML");
            }
        }
    }

    let outcome = lifecycle::apply(
        store,
        invoice,
        TransitionRequest {
            target: signal.target,
            stamp: signal.stamp,
            source: signal.source,
            data: signal.raw,
        },
    )
    .await?;

    Ok(ReconcileOutcome {
        invoice_id: invoice.invoice_id,
        status: outcome.status(),
        applied: outcome.applied(),
    })
}

/// Handle an authenticated webhook delivery.
pub async fn handle_webhook(
    store: &dyn InvoiceStore,
    artifacts: &dyn ArtifactStorage,
    event: WebhookEvent,
    raw: serde_json::Value,
) -> Result<ReconcileOutcome, AppError> {
    let event_type = event.type_name();
    let (reference, signal) = event.into_signal(raw);

    let result = reconcile(store, artifacts, &reference, signal).await;
    let label = match &result {
        Ok(outcome) if outcome.applied => "applied",
        Ok(_) => "noop",
        Err(_) => "error",
    };
    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[event_type, label])
        .inc();

    result
}

/// Result of an operator-triggered authority poll.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub invoice_id: i64,
    pub status: InvoiceStatus,
    pub applied: bool,
    /// False when the invoice has no CUFE yet and the authority was not
    /// queried.
    pub polled: bool,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
}

/// Operator-triggered authority poll; the response is reconciled exactly
/// like a webhook. Queries by CUFE, falling back to the submission receipt
/// uuid for invoices the authority has not accepted yet.
pub async fn poll_authority(
    store: &dyn InvoiceStore,
    gateway: &dyn DianGateway,
    artifacts: &dyn ArtifactStorage,
    config: &Config,
    invoice_id: i64,
) -> Result<PollOutcome, AppError> {
    let invoice = store
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {invoice_id} not found")))?;

    let Some(document_id) = invoice.cufe.clone().or_else(|| invoice.dian_uuid.clone()) else {
        return Ok(PollOutcome {
            invoice_id,
            status: invoice.status,
            applied: false,
            polled: false,
            response_code: None,
            response_message: None,
        });
    };

    let response = with_stage_timeout(
        config.pipeline.stage_timeout,
        Stage::StatusQuery,
        gateway.document_status(&document_id),
    )
    .await?;

    let (target, stamp) = match response.verdict {
        AuthorityVerdict::Accepted => (
            InvoiceStatus::Accepted,
            Some(AuthorityStamp {
                cufe: response.document_uuid.clone(),
                dian_uuid: response.document_uuid.clone(),
            }),
        ),
        AuthorityVerdict::Rejected => (InvoiceStatus::Rejected, None),
        AuthorityVerdict::Pending => (InvoiceStatus::Sent, None),
    };

    let raw = json!({
        "document_id": document_id,
        "response_code": response.response_code.clone(),
        "response_message": response.response_message.clone(),
    });

    let outcome = apply_signal(
        store,
        artifacts,
        &invoice,
        StatusSignal {
            target,
            stamp,
            response_xml: response.response_xml.clone(),
            source: TransitionSource::Poll,
            raw,
        },
    )
    .await?;

    Ok(PollOutcome {
        invoice_id,
        status: outcome.status,
        applied: outcome.applied,
        polled: true,
        response_code: response.response_code,
        response_message: response.response_message,
    })
}
