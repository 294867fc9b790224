//! HTTP gateway implementation.
//!
//! Rendering, signing and PDF generation go to the document engine sidecar;
//! submission and status queries go to the DIAN relay (directly or through a
//! configured PST), authenticating with the relay's login endpoint first.

use async_trait::async_trait;
use base64::Engine as _;
use facturacion_core::error::AppError;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::gateway::{AuthorityResponse, AuthorityVerdict, DianGateway, RenderInput};
use super::metrics::AUTHORITY_REQUESTS_TOTAL;
use crate::config::DianConfig;

/// Response envelope from the document engine.
#[derive(Debug, Deserialize)]
struct EngineResponse {
    success: bool,
    #[serde(default)]
    xml: Option<String>,
    #[serde(default)]
    pdf_base64: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl EngineResponse {
    fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "document engine reported failure".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Relay response for `insertinvoice` and `GetDocumentStatus`.
#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    accepted: Option<bool>,
    #[serde(default)]
    document_uuid: Option<String>,
    #[serde(default)]
    response_code: Option<String>,
    #[serde(default)]
    response_message: Option<String>,
    #[serde(default)]
    response_xml: Option<String>,
}

impl From<RelayResponse> for AuthorityResponse {
    fn from(relay: RelayResponse) -> Self {
        let verdict = match relay.accepted {
            Some(true) => AuthorityVerdict::Accepted,
            Some(false) => AuthorityVerdict::Rejected,
            // A 2xx acknowledgement without a verdict: the document is in
            // the authority's queue.
            None => AuthorityVerdict::Pending,
        };
        AuthorityResponse {
            verdict,
            document_uuid: relay.document_uuid,
            response_code: relay.response_code,
            response_message: relay.response_message,
            response_xml: relay.response_xml,
        }
    }
}

#[derive(Clone)]
pub struct HttpDianGateway {
    client: Client,
    config: DianConfig,
}

impl HttpDianGateway {
    pub fn new(config: DianConfig, request_timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Config(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn engine_call(&self, path: &str, body: serde_json::Value) -> Result<EngineResponse, AppError> {
        let url = format!("{}/{}", self.config.engine_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Render {
                reason: format!("document engine unreachable: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Render {
                reason: format!("document engine returned {status}"),
            });
        }

        response.json::<EngineResponse>().await.map_err(|e| AppError::Render {
            reason: format!("invalid document engine response: {e}"),
        })
    }

    /// Authenticate against the relay; tokens are short-lived so each
    /// operation logs in fresh.
    async fn login(&self) -> Result<String, AppError> {
        let base = self.config.submission_base_url().trim_end_matches('/');
        let response = self
            .client
            .post(format!("{base}/login"))
            .query(&[
                ("username", self.config.api_username.as_str()),
                ("password", self.config.api_password.expose_secret().as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Submission {
                status_code: None,
                reason: format!("relay login failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Submission {
                status_code: Some(status.as_u16()),
                reason: format!("relay login returned {status}"),
            });
        }

        let login: LoginResponse = response.json().await.map_err(|e| AppError::Submission {
            status_code: None,
            reason: format!("invalid relay login response: {e}"),
        })?;

        Ok(login.token)
    }

    async fn relay_call(
        &self,
        operation: &'static str,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<AuthorityResponse, AppError> {
        let result = async {
            let response = request.send().await.map_err(|e| AppError::Submission {
                status_code: None,
                reason: format!("{path} request failed: {e}"),
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Submission {
                    status_code: Some(status.as_u16()),
                    reason: if body.is_empty() {
                        format!("{path} returned {status}")
                    } else {
                        format!("{path} returned {status}: {body}")
                    },
                });
            }

            let relay: RelayResponse =
                response.json().await.map_err(|e| AppError::Submission {
                    status_code: None,
                    reason: format!("invalid {path} response: {e}"),
                })?;

            Ok(AuthorityResponse::from(relay))
        }
        .await;

        let label = if result.is_ok() { "ok" } else { "error" };
        AUTHORITY_REQUESTS_TOTAL
            .with_label_values(&[operation, label])
            .inc();

        result
    }
}

#[async_trait]
impl DianGateway for HttpDianGateway {
    async fn render(&self, input: &RenderInput) -> Result<String, AppError> {
        let body = serde_json::to_value(input)
            .map_err(|e| AppError::Render {
                reason: format!("failed to serialize render input: {e}"),
            })?;
        let engine = self.engine_call("render", body).await?;
        if !engine.success {
            return Err(AppError::Render {
                reason: engine.failure_reason(),
            });
        }
        engine.xml.ok_or_else(|| AppError::Render {
            reason: "document engine returned no XML".to_string(),
        })
    }

    async fn sign(&self, xml: &str) -> Result<String, AppError> {
        let body = json!({
            "xml": xml,
            "certificate_path": self.config.certificate_path,
            "certificate_password": self.config.certificate_password.expose_secret(),
        });
        let engine = self.engine_call("sign", body).await.map_err(|e| match e {
            AppError::Render { reason } => AppError::Signing { reason },
            other => other,
        })?;
        if !engine.success {
            return Err(AppError::Signing {
                reason: engine.failure_reason(),
            });
        }
        engine.xml.ok_or_else(|| AppError::Signing {
            reason: "document engine returned no signed XML".to_string(),
        })
    }

    async fn submit(&self, signed_xml: &str) -> Result<AuthorityResponse, AppError> {
        let token = self.login().await?;
        let base = self.config.submission_base_url().trim_end_matches('/');
        let request = self
            .client
            .post(format!("{base}/insertinvoice"))
            .header("Authorization", format!("misfacturas {token}"))
            .header("Content-Type", "application/xml")
            .body(signed_xml.to_string());
        self.relay_call("submit", "insertinvoice", request).await
    }

    async fn document_status(&self, cufe: &str) -> Result<AuthorityResponse, AppError> {
        let token = self.login().await?;
        let base = self.config.submission_base_url().trim_end_matches('/');
        let request = self
            .client
            .post(format!("{base}/GetDocumentStatus"))
            .header("Authorization", format!("misfacturas {token}"))
            .json(&json!({ "DocumentId": cufe, "DocumentType": "01" }));
        self.relay_call("document_status", "GetDocumentStatus", request)
            .await
    }

    async fn render_pdf(&self, input: &RenderInput) -> Result<Vec<u8>, AppError> {
        let body = serde_json::to_value(input)
            .map_err(|e| AppError::Render {
                reason: format!("failed to serialize render input: {e}"),
            })?;
        let engine = self.engine_call("pdf", body).await?;
        if !engine.success {
            return Err(AppError::Render {
                reason: engine.failure_reason(),
            });
        }
        let encoded = engine.pdf_base64.ok_or_else(|| AppError::Render {
            reason: "document engine returned no PDF".to_string(),
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| AppError::Render {
                reason: format!("invalid PDF encoding: {e}"),
            })
    }
}
