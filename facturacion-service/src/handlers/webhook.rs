//! Authority webhook handler.

use axum::{extract::State, http::HeaderMap, Json};
use facturacion_core::error::AppError;
use secrecy::{ExposeSecret, Secret};
use subtle::ConstantTimeEq;

use crate::dtos::{WebhookAck, WebhookEvent};
use crate::services::reconciliation;
use crate::startup::AppState;

/// Shared-secret bearer check, in constant time. Runs before the payload is
/// even parsed so an unauthorized caller learns nothing about our invoices.
fn authorize(headers: &HeaderMap, secret: &Secret<String>) -> Result<(), AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing webhook authorization".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".to_string()))?;

    if bool::from(token.as_bytes().ct_eq(secret.expose_secret().as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Invalid webhook token".to_string()))
    }
}

/// Receive an asynchronous status callback and reconcile it.
pub async fn dian_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<WebhookAck>, AppError> {
    authorize(&headers, &state.config.webhook.secret)?;

    let event: WebhookEvent = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::BadRequest(format!("Unsupported webhook payload: {e}")))?;

    tracing::info!(event_type = event.type_name(), "Processing authority webhook");

    let outcome = reconciliation::handle_webhook(
        state.store.as_ref(),
        state.artifacts.as_ref(),
        event,
        raw,
    )
    .await?;

    Ok(Json(WebhookAck {
        success: true,
        invoice_id: outcome.invoice_id,
        status: outcome.status,
        applied: outcome.applied,
    }))
}
