//! Shared test harness: in-process application with an in-memory store and a
//! scripted gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use facturacion_core::error::AppError;
use facturacion_service::config::{
    ArtifactConfig, Config, DatabaseConfig, DianConfig, DianEnvironment, PipelineConfig,
    ServerConfig, WebhookConfig,
};
use facturacion_service::models::{Customer, Organization};
use facturacion_service::services::artifacts::LocalArtifactStorage;
use facturacion_service::services::gateway::{
    AuthorityResponse, AuthorityVerdict, DianGateway, RenderInput,
};
use facturacion_service::services::store::MemoryStore;
use facturacion_service::startup::{AppState, Application};
use secrecy::Secret;
use serde_json::{json, Value};
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const TEST_CUSTOMER_ID: i64 = 1;

/// Behavior of a render/sign/pdf stage.
#[derive(Clone)]
pub enum StagePlan {
    Ok,
    Fail(String),
}

/// Behavior of the submit/status relay calls.
#[derive(Clone)]
pub enum RelayPlan {
    Accept { document_uuid: String },
    Reject { response_code: String, response_message: String },
    Pending { document_uuid: String },
    TransportError { status_code: Option<u16>, reason: String },
}

impl RelayPlan {
    fn into_result(self, operation: &str) -> Result<AuthorityResponse, AppError> {
        match self {
            RelayPlan::Accept { document_uuid } => Ok(AuthorityResponse {
                verdict: AuthorityVerdict::Accepted,
                document_uuid: Some(document_uuid),
                response_code: Some("00".to_string()),
                response_message: Some("Documento aceptado".to_string()),
                response_xml: None,
            }),
            RelayPlan::Reject {
                response_code,
                response_message,
            } => Ok(AuthorityResponse {
                verdict: AuthorityVerdict::Rejected,
                document_uuid: None,
                response_code: Some(response_code),
                response_message: Some(response_message),
                response_xml: None,
            }),
            RelayPlan::Pending { document_uuid } => Ok(AuthorityResponse {
                verdict: AuthorityVerdict::Pending,
                document_uuid: Some(document_uuid),
                response_code: Some("98".to_string()),
                response_message: Some("Documento en proceso".to_string()),
                response_xml: None,
            }),
            RelayPlan::TransportError {
                status_code,
                reason,
            } => Err(AppError::Submission {
                status_code,
                reason: format!("{operation}: {reason}"),
            }),
        }
    }
}

/// Scripted gateway standing in for the document engine and the DIAN relay.
pub struct MockGateway {
    pub render: Mutex<StagePlan>,
    pub sign: Mutex<StagePlan>,
    pub submit: Mutex<RelayPlan>,
    pub status: Mutex<RelayPlan>,
    pub pdf: Mutex<StagePlan>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            render: Mutex::new(StagePlan::Ok),
            sign: Mutex::new(StagePlan::Ok),
            submit: Mutex::new(RelayPlan::Accept {
                document_uuid: "cufe-test-0001".to_string(),
            }),
            status: Mutex::new(RelayPlan::Pending {
                document_uuid: "cufe-test-0001".to_string(),
            }),
            pdf: Mutex::new(StagePlan::Ok),
        }
    }
}

impl MockGateway {
    pub fn set_submit(&self, plan: RelayPlan) {
        *self.submit.lock().unwrap() = plan;
    }

    pub fn set_status(&self, plan: RelayPlan) {
        *self.status.lock().unwrap() = plan;
    }

    pub fn fail_render(&self, reason: &str) {
        *self.render.lock().unwrap() = StagePlan::Fail(reason.to_string());
    }

    pub fn fail_sign(&self, reason: &str) {
        *self.sign.lock().unwrap() = StagePlan::Fail(reason.to_string());
    }
}

#[async_trait]
impl DianGateway for MockGateway {
    async fn render(&self, input: &RenderInput) -> Result<String, AppError> {
        match self.render.lock().unwrap().clone() {
            StagePlan::Ok => Ok(format!(
                "<Invoice><ID>{}-{}</ID></Invoice>",
                input.invoice.series, input.invoice.number
            )),
            StagePlan::Fail(reason) => Err(AppError::Render { reason }),
        }
    }

    async fn sign(&self, xml: &str) -> Result<String, AppError> {
        match self.sign.lock().unwrap().clone() {
            StagePlan::Ok => Ok(format!("<Signed>{xml}</Signed>")),
            StagePlan::Fail(reason) => Err(AppError::Signing { reason }),
        }
    }

    async fn submit(&self, _signed_xml: &str) -> Result<AuthorityResponse, AppError> {
        self.submit.lock().unwrap().clone().into_result("submit")
    }

    async fn document_status(&self, _cufe: &str) -> Result<AuthorityResponse, AppError> {
        self.status
            .lock()
            .unwrap()
            .clone()
            .into_result("document_status")
    }

    async fn render_pdf(&self, input: &RenderInput) -> Result<Vec<u8>, AppError> {
        match self.pdf.lock().unwrap().clone() {
            StagePlan::Ok => Ok(format!(
                "%PDF-1.4 {}-{}",
                input.invoice.series, input.invoice.number
            )
            .into_bytes()),
            StagePlan::Fail(reason) => Err(AppError::Render { reason }),
        }
    }
}

fn test_config(artifacts_path: &str) -> Config {
    Config {
        service_name: "facturacion-service".to_string(),
        log_level: "info".to_string(),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 5,
            min_connections: 1,
        },
        dian: DianConfig {
            software_id: "test-software".to_string(),
            software_pin: Secret::new("1234".to_string()),
            technical_key: Secret::new("tech-key".to_string()),
            certificate_path: "certs/test.p12".to_string(),
            certificate_password: Secret::new("changeit".to_string()),
            environment: DianEnvironment::Habilitacion,
            api_base_url: "http://relay.invalid/api".to_string(),
            api_username: "tester".to_string(),
            api_password: Secret::new("secret".to_string()),
            engine_url: "http://engine.invalid".to_string(),
            pst_base_url: None,
            pst_api_key: None,
        },
        webhook: WebhookConfig {
            secret: Secret::new(WEBHOOK_SECRET.to_string()),
        },
        artifacts: ArtifactConfig {
            base_path: artifacts_path.to_string(),
            public_base_url: "http://localhost/artifacts".to_string(),
        },
        pipeline: PipelineConfig {
            stage_timeout: Duration::from_secs(5),
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub artifacts_path: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let artifacts_path = format!("target/test-artifacts-{}", Uuid::new_v4());
        let config = test_config(&artifacts_path);

        let store = Arc::new(MemoryStore::new());
        store.insert_customer(Customer {
            customer_id: TEST_CUSTOMER_ID,
            tax_id: "900123456-7".to_string(),
            business_name: "Cliente de Prueba SAS".to_string(),
            address: Some("Calle 1 # 2-3".to_string()),
            city: Some("Bogotá".to_string()),
            state: Some("Cundinamarca".to_string()),
            postal_code: Some("110111".to_string()),
            country_code: "CO".to_string(),
            email: Some("cliente@example.com".to_string()),
            phone: None,
        });
        store.set_organization(Organization {
            organization_id: 1,
            tax_id: "800765432-1".to_string(),
            business_name: "Emisor de Prueba SAS".to_string(),
            address: Some("Carrera 9 # 10-11".to_string()),
            city: Some("Bogotá".to_string()),
            state: Some("Cundinamarca".to_string()),
            postal_code: Some("110111".to_string()),
            country_code: "CO".to_string(),
            email: Some("emisor@example.com".to_string()),
            phone: None,
        });

        let gateway = Arc::new(MockGateway::default());
        let artifacts = LocalArtifactStorage::new(
            artifacts_path.clone(),
            config.artifacts.public_base_url.clone(),
        )
        .await
        .expect("Failed to create artifact storage");

        let state = AppState {
            config: Arc::new(config),
            store: store.clone(),
            gateway: gateway.clone(),
            artifacts: Arc::new(artifacts),
        };

        let app = Application::with_state(state, "127.0.0.1", 0)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept requests
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            client,
            store,
            gateway,
            artifacts_path,
        }
    }

    /// A well-formed creation request: one item, quantity 1, unit price
    /// 100000, no discount, 19% VAT.
    pub fn creation_request(series: &str, number: &str) -> Value {
        json!({
            "customer_id": TEST_CUSTOMER_ID,
            "series": series,
            "number": number,
            "issue_date": "2026-03-02",
            "issue_time": "10:30:00",
            "items": [
                {
                    "item_id": 42,
                    "description": "Servicio profesional",
                    "quantity": 1,
                    "unit_price": 100000,
                    "discount_pct": 0,
                    "tax_rate": 19
                }
            ]
        })
    }

    pub async fn issue_invoice(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}/invoices", self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn invoice_status(&self, invoice_id: i64) -> Value {
        let response = self
            .client
            .get(format!(
                "{}/invoices/status?invoice_id={}",
                self.address, invoice_id
            ))
            .send()
            .await
            .expect("Failed to execute request");
        assert!(
            response.status().is_success(),
            "status lookup failed: {}",
            response.status()
        );
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn post_webhook(&self, token: Option<&str>, body: &Value) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/invoices/webhook", self.address))
            .json(body);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn poll_status(&self, invoice_id: i64) -> reqwest::Response {
        self.client
            .post(format!("{}/invoices/status", self.address))
            .json(&json!({ "invoice_id": invoice_id }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.artifacts_path).await;
    }
}
