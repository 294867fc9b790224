//! Invoice issuance, status lookup, authority poll and PDF handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use facturacion_core::error::AppError;

use crate::dtos::{
    CreateInvoiceRequest, InvoiceStatusResponse, IssueResponse, PdfResponse, PollStatusRequest,
    PollStatusResponse, StatusQueryParams,
};
use crate::services::{pipeline, reconciliation};
use crate::startup::AppState;

/// Issue an electronic invoice: persist the draft, run the document pipeline
/// and settle the lifecycle from the authority verdict.
pub async fn issue_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<IssueResponse>), AppError> {
    tracing::info!(
        series = request.series.as_deref().unwrap_or(""),
        number = request.number.as_deref().unwrap_or(""),
        item_count = request.items.len(),
        "Issuing invoice"
    );

    let invoice = pipeline::issue_invoice(
        state.store.as_ref(),
        state.gateway.as_ref(),
        state.artifacts.as_ref(),
        &state.config,
        request,
    )
    .await?;

    tracing::info!(
        invoice_id = invoice.invoice_id,
        status = invoice.status.as_str(),
        "Invoice issuance finished"
    );

    Ok((StatusCode::CREATED, Json(IssueResponse::from(invoice))))
}

/// Look up an invoice by any of its identifiers, with its items and the
/// event history newest first.
pub async fn invoice_status(
    State(state): State<AppState>,
    Query(params): Query<StatusQueryParams>,
) -> Result<Json<InvoiceStatusResponse>, AppError> {
    let reference = params.into_ref();
    if reference.is_empty() {
        return Err(AppError::Validation(
            "invoice_id, cufe or dian_uuid is required".to_string(),
        ));
    }

    let invoice = state
        .store
        .find_invoice(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))?;

    let items = state.store.get_items(invoice.invoice_id).await?;
    let events = state.store.list_events(invoice.invoice_id).await?;

    Ok(Json(InvoiceStatusResponse {
        invoice,
        items,
        events,
    }))
}

/// Query the authority for the current document status and reconcile it.
pub async fn poll_status(
    State(state): State<AppState>,
    Json(request): Json<PollStatusRequest>,
) -> Result<Json<PollStatusResponse>, AppError> {
    let invoice_id = request
        .invoice_id
        .ok_or_else(|| AppError::Validation("invoice_id is required".to_string()))?;

    let outcome = reconciliation::poll_authority(
        state.store.as_ref(),
        state.gateway.as_ref(),
        state.artifacts.as_ref(),
        &state.config,
        invoice_id,
    )
    .await?;

    let message = if outcome.polled {
        None
    } else {
        Some("Invoice has no CUFE yet; the authority cannot be queried".to_string())
    };

    Ok(Json(PollStatusResponse {
        invoice_id: outcome.invoice_id,
        status: outcome.status,
        applied: outcome.applied,
        response_code: outcome.response_code,
        response_message: outcome.response_message,
        message,
    }))
}

/// Generate (or return the already generated) PDF artifact for an invoice.
pub async fn generate_pdf(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<Json<PdfResponse>, AppError> {
    let pdf_url = pipeline::ensure_pdf(
        state.store.as_ref(),
        state.gateway.as_ref(),
        state.artifacts.as_ref(),
        &state.config,
        invoice_id,
    )
    .await?;

    Ok(Json(PdfResponse {
        invoice_id,
        pdf_url,
    }))
}
