//! Configuration for facturacion-service.
//!
//! Loaded once at process start and injected into the application state;
//! nothing in the core mutates it afterwards.

use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dian: DianConfig,
    pub webhook: WebhookConfig,
    pub artifacts: ArtifactConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Target DIAN environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DianEnvironment {
    /// Sandbox ("habilitación") endpoint.
    Habilitacion,
    Produccion,
}

impl DianEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DianEnvironment::Habilitacion => "HABILITACION",
            DianEnvironment::Produccion => "PRODUCCION",
        }
    }

    fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCCION" | "PRODUCTION" => DianEnvironment::Produccion,
            _ => DianEnvironment::Habilitacion,
        }
    }
}

/// Issuer technical profile plus endpoints for the authority relay and the
/// document engine sidecar (rendering, signing, PDF).
#[derive(Clone, Debug)]
pub struct DianConfig {
    pub software_id: String,
    pub software_pin: Secret<String>,
    pub technical_key: Secret<String>,
    pub certificate_path: String,
    pub certificate_password: Secret<String>,
    pub environment: DianEnvironment,
    pub api_base_url: String,
    pub api_username: String,
    pub api_password: Secret<String>,
    pub engine_url: String,
    pub pst_base_url: Option<String>,
    pub pst_api_key: Option<Secret<String>>,
}

impl DianConfig {
    /// Base URL submissions go to: the PST relay when configured, the
    /// authority API otherwise.
    pub fn submission_base_url(&self) -> &str {
        self.pst_base_url.as_deref().unwrap_or(&self.api_base_url)
    }
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub secret: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct ArtifactConfig {
    pub base_path: String,
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub stage_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("FACTURACION_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("FACTURACION_PORT")
            .unwrap_or_else(|_| "3007".to_string())
            .parse()?;

        let database_url =
            env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let stage_timeout_secs: u64 = env::var("PIPELINE_STAGE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;

        Ok(Self {
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "facturacion-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(database_url),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            dian: DianConfig {
                software_id: env::var("DIAN_SOFTWARE_ID").unwrap_or_default(),
                software_pin: Secret::new(env::var("DIAN_SOFTWARE_PIN").unwrap_or_default()),
                technical_key: Secret::new(env::var("DIAN_TECHNICAL_KEY").unwrap_or_default()),
                certificate_path: env::var("DIAN_CERTIFICATE_PATH").unwrap_or_default(),
                certificate_password: Secret::new(
                    env::var("DIAN_CERTIFICATE_PASSWORD").unwrap_or_default(),
                ),
                environment: DianEnvironment::parse(
                    &env::var("DIAN_ENVIRONMENT").unwrap_or_else(|_| "HABILITACION".to_string()),
                ),
                api_base_url: env::var("DIAN_API_BASE_URL")
                    .unwrap_or_else(|_| "https://apivp.misfacturas.com.co/api".to_string()),
                api_username: env::var("DIAN_API_USERNAME").unwrap_or_default(),
                api_password: Secret::new(env::var("DIAN_API_PASSWORD").unwrap_or_default()),
                engine_url: env::var("DOCUMENT_ENGINE_URL")
                    .unwrap_or_else(|_| "http://document-engine:5000".to_string()),
                pst_base_url: env::var("PST_BASE_URL").ok(),
                pst_api_key: env::var("PST_API_KEY").ok().map(Secret::new),
            },
            webhook: WebhookConfig {
                secret: Secret::new(
                    env::var("WEBHOOK_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
                ),
            },
            artifacts: ArtifactConfig {
                base_path: env::var("ARTIFACTS_PATH").unwrap_or_else(|_| "artifacts".to_string()),
                public_base_url: env::var("ARTIFACTS_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3007/artifacts".to_string()),
            },
            pipeline: PipelineConfig {
                stage_timeout: Duration::from_secs(stage_timeout_secs),
            },
        })
    }
}
