//! Document pipeline gateway.
//!
//! The core never renders, signs or submits documents itself; it drives a
//! gateway that does. Implementations may call an HTTP sidecar, shell out to
//! a local tool, or link a library; the orchestration only depends on these
//! contracts.

use async_trait::async_trait;
use facturacion_core::error::AppError;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::DianConfig;
use crate::models::{Customer, Invoice, InvoiceItem, Organization};

/// Everything the renderer needs to produce a UBL 2.1 document.
#[derive(Debug, Clone, Serialize)]
pub struct RenderInput {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub customer: Customer,
    pub organization: Organization,
    pub issuer: IssuerProfile,
}

/// Issuer technical profile forwarded to the document engine; the engine
/// needs the pin and technical key to compute the document fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct IssuerProfile {
    pub software_id: String,
    pub software_pin: String,
    pub technical_key: String,
    pub environment: String,
}

impl IssuerProfile {
    pub fn from_config(config: &DianConfig) -> Self {
        Self {
            software_id: config.software_id.clone(),
            software_pin: config.software_pin.expose_secret().clone(),
            technical_key: config.technical_key.expose_secret().clone(),
            environment: config.environment.as_str().to_string(),
        }
    }
}

/// Authority verdict on a submitted or queried document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityVerdict {
    Accepted,
    Rejected,
    /// The authority received the document but has not decided yet; the
    /// final verdict arrives through a webhook or a later poll.
    Pending,
}

/// Parsed authority response from a submission or status query.
#[derive(Debug, Clone)]
pub struct AuthorityResponse {
    pub verdict: AuthorityVerdict,
    pub document_uuid: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub response_xml: Option<String>,
}

#[async_trait]
pub trait DianGateway: Send + Sync {
    /// Produce the UBL 2.1 XML for an invoice. No side effects.
    async fn render(&self, input: &RenderInput) -> Result<String, AppError>;

    /// Digitally sign a rendered document with the issuer certificate.
    async fn sign(&self, xml: &str) -> Result<String, AppError>;

    /// Submit a signed document to the authority. Transport errors, non-2xx
    /// responses and malformed bodies all surface as submission errors;
    /// retry policy belongs to the caller.
    async fn submit(&self, signed_xml: &str) -> Result<AuthorityResponse, AppError>;

    /// Query the authority for the current status of a document by CUFE.
    async fn document_status(&self, cufe: &str) -> Result<AuthorityResponse, AppError>;

    /// Produce the printable PDF representation of an invoice.
    async fn render_pdf(&self, input: &RenderInput) -> Result<Vec<u8>, AppError>;
}
