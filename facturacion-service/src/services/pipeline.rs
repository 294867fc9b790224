//! Document pipeline orchestration.
//!
//! Drives render → sign → submit for a freshly persisted draft, applies the
//! authority verdict through the state machine, and records stage failures
//! without leaving the invoice in an intermediate state.

use facturacion_core::error::AppError;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tracing::{error, instrument, warn};

use super::artifacts::ArtifactStorage;
use super::builder;
use super::gateway::{AuthorityResponse, AuthorityVerdict, DianGateway, IssuerProfile, RenderInput};
use super::lifecycle::{self, TransitionRequest, TransitionSource};
use super::metrics::{INVOICES_ISSUED_TOTAL, PIPELINE_STAGE_DURATION};
use super::store::InvoiceStore;
use crate::config::Config;
use crate::dtos::CreateInvoiceRequest;
use crate::models::{AuthorityStamp, EventType, Invoice, InvoiceStatus, NewEvent};

#[derive(Debug, Clone, Copy)]
pub enum Stage {
    Render,
    Sign,
    Submit,
    StatusQuery,
    Pdf,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
            Stage::StatusQuery => "status_query",
            Stage::Pdf => "pdf",
        }
    }

    fn timeout_error(&self, limit: Duration) -> AppError {
        let reason = format!("{} stage timed out after {}s", self.as_str(), limit.as_secs());
        match self {
            Stage::Render | Stage::Pdf => AppError::Render { reason },
            Stage::Sign => AppError::Signing { reason },
            Stage::Submit | Stage::StatusQuery => AppError::Submission {
                status_code: None,
                reason,
            },
        }
    }
}

/// Run one external call with a bounded timeout; elapsing is reported as the
/// stage's own failure kind.
pub async fn with_stage_timeout<T, F>(limit: Duration, stage: Stage, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let timer = PIPELINE_STAGE_DURATION
        .with_label_values(&[stage.as_str()])
        .start_timer();
    let result = match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(stage.timeout_error(limit)),
    };
    timer.observe_duration();
    result
}

/// Assemble the full render input for an invoice.
pub async fn load_render_input(
    store: &dyn InvoiceStore,
    config: &Config,
    invoice: &Invoice,
) -> Result<RenderInput, AppError> {
    let items = store.get_items(invoice.invoice_id).await?;
    let customer = store
        .get_customer(invoice.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", invoice.customer_id)))?;
    let organization = store.get_organization().await?.ok_or_else(|| {
        AppError::Config(anyhow::anyhow!("organization profile is not configured"))
    })?;

    Ok(RenderInput {
        invoice: invoice.clone(),
        items,
        customer,
        organization,
        issuer: IssuerProfile::from_config(&config.dian),
    })
}

/// Issue an invoice: validate and persist the draft, run the document
/// pipeline, and settle the lifecycle from the authority verdict.
#[instrument(skip_all, fields(series = request.series.as_deref().unwrap_or(""), number = request.number.as_deref().unwrap_or("")))]
pub async fn issue_invoice(
    store: &dyn InvoiceStore,
    gateway: &dyn DianGateway,
    artifacts: &dyn ArtifactStorage,
    config: &Config,
    request: CreateInvoiceRequest,
) -> Result<Invoice, AppError> {
    let draft = builder::create_draft(store, &request).await?;
    let invoice_id = draft.invoice_id;

    let response = match run_stages(store, gateway, artifacts, config, &draft).await {
        Ok(response) => response,
        Err(err) => {
            record_stage_failure(store, invoice_id, &err).await;
            INVOICES_ISSUED_TOTAL.with_label_values(&["failed"]).inc();
            return Err(err);
        }
    };

    let (target, stamp, outcome_label) = match response.verdict {
        AuthorityVerdict::Accepted => (
            InvoiceStatus::Accepted,
            Some(AuthorityStamp {
                cufe: response.document_uuid.clone(),
                dian_uuid: response.document_uuid.clone(),
            }),
            "accepted",
        ),
        AuthorityVerdict::Rejected => (InvoiceStatus::Rejected, None, "rejected"),
        AuthorityVerdict::Pending => (
            InvoiceStatus::Sent,
            Some(AuthorityStamp {
                cufe: None,
                dian_uuid: response.document_uuid.clone(),
            }),
            "sent",
        ),
    };

    lifecycle::apply(
        store,
        &draft,
        TransitionRequest {
            target,
            stamp,
            source: TransitionSource::Pipeline,
            data: json!({
                "dian_uuid": response.document_uuid,
                "response_code": response.response_code,
                "response_message": response.response_message,
            }),
        },
    )
    .await?;

    INVOICES_ISSUED_TOTAL
        .with_label_values(&[outcome_label])
        .inc();

    store
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {invoice_id} not found")))
}

async fn run_stages(
    store: &dyn InvoiceStore,
    gateway: &dyn DianGateway,
    artifacts: &dyn ArtifactStorage,
    config: &Config,
    invoice: &Invoice,
) -> Result<AuthorityResponse, AppError> {
    let limit = config.pipeline.stage_timeout;

    let input = load_render_input(store, config, invoice).await?;
    let xml = with_stage_timeout(limit, Stage::Render, gateway.render(&input)).await?;
    let signed = with_stage_timeout(limit, Stage::Sign, gateway.sign(&xml)).await?;
    let response = with_stage_timeout(limit, Stage::Submit, gateway.submit(&signed)).await?;

    // The authority already has the document; an archival failure must not
    // roll back its verdict.
    let key = format!(
        "invoices/{}/{}-{}.xml",
        invoice.invoice_id, invoice.series, invoice.number
    );
    match artifacts.store(&key, signed.into_bytes()).await {
        Ok(url) => {
            if let Err(err) = store.set_xml_url(invoice.invoice_id, &url).await {
                warn!(invoice_id = invoice.invoice_id, error = %err, "Failed to record xml_url");
            }
        }
        Err(err) => {
            warn!(invoice_id = invoice.invoice_id, error = %err, "Failed to archive signed XML");
        }
    }

    Ok(response)
}

/// A stage failed: the invoice stays in DRAFT and the event log records what
/// happened, then the error propagates to the caller for manual retry.
async fn record_stage_failure(store: &dyn InvoiceStore, invoice_id: i64, failure: &AppError) {
    let event = NewEvent::failed(
        invoice_id,
        EventType::ErrorOccurred,
        json!({
            "stage": failure.kind(),
            "reason": failure.to_string(),
        }),
    );
    if let Err(err) = store.append_event(event).await {
        error!(invoice_id, error = %err, "Failed to record pipeline failure event");
    }
}

/// Generate the PDF artifact for an invoice, returning the existing URL when
/// one was already produced.
#[instrument(skip(store, gateway, artifacts, config))]
pub async fn ensure_pdf(
    store: &dyn InvoiceStore,
    gateway: &dyn DianGateway,
    artifacts: &dyn ArtifactStorage,
    config: &Config,
    invoice_id: i64,
) -> Result<String, AppError> {
    let invoice = store
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {invoice_id} not found")))?;

    if let Some(url) = invoice.pdf_url.clone() {
        return Ok(url);
    }

    let input = load_render_input(store, config, &invoice).await?;
    let pdf = with_stage_timeout(
        config.pipeline.stage_timeout,
        Stage::Pdf,
        gateway.render_pdf(&input),
    )
    .await?;

    let key = format!(
        "invoices/{}/{}-{}.pdf",
        invoice.invoice_id, invoice.series, invoice.number
    );
    let url = artifacts.store(&key, pdf).await?;
    store.set_pdf_url(invoice_id, &url).await?;
    store
        .append_event(NewEvent::completed(
            invoice_id,
            EventType::PdfGenerated,
            json!({ "pdf_url": url.clone() }),
        ))
        .await?;

    Ok(url)
}
