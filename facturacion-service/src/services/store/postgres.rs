//! PostgreSQL invoice store.

use async_trait::async_trait;
use facturacion_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use super::InvoiceStore;
use crate::models::{
    AuthorityStamp, Customer, Invoice, InvoiceEvent, InvoiceItem, InvoiceRef, InvoiceStatus,
    NewEvent, NewInvoice, NewItem, Organization,
};
use crate::services::metrics::DB_QUERY_DURATION;

const INVOICE_COLUMNS: &str = "invoice_id, customer_id, series, number, issue_date, issue_time, \
     currency, exchange_rate, operation_type, line_extension_amount, tax_exclusive_amount, \
     tax_inclusive_amount, allowance_total_amount, charge_total_amount, payable_amount, \
     tax_amount, tax_rate, status, cufe, dian_uuid, xml_url, pdf_url, notes, created_at, updated_at";

/// Connection pool wrapper.
#[derive(Clone)]
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    #[instrument(skip(database_url), fields(service = "facturacion-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_by_column(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let query = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE {column} = $1");
        sqlx::query_as::<_, Invoice>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to find invoice: {}", e)))
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    #[instrument(skip(self, invoice, items, event_payload), fields(series = %invoice.series, number = %invoice.number))]
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewItem>,
        event_payload: serde_json::Value,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let created = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (customer_id, series, number, issue_date, issue_time, currency,
                exchange_rate, operation_type, line_extension_amount, tax_exclusive_amount,
                tax_inclusive_amount, allowance_total_amount, charge_total_amount, payable_amount,
                tax_amount, tax_rate, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.customer_id)
        .bind(&invoice.series)
        .bind(&invoice.number)
        .bind(invoice.issue_date)
        .bind(invoice.issue_time)
        .bind(&invoice.currency)
        .bind(invoice.exchange_rate)
        .bind(&invoice.operation_type)
        .bind(invoice.line_extension_amount)
        .bind(invoice.tax_exclusive_amount)
        .bind(invoice.tax_inclusive_amount)
        .bind(invoice.allowance_total_amount)
        .bind(invoice.charge_total_amount)
        .bind(invoice.payable_amount)
        .bind(invoice.tax_amount)
        .bind(invoice.tax_rate)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(&invoice.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Duplicate(format!(
                    "Invoice {}-{} already exists",
                    invoice.series, invoice.number
                ))
            }
            _ => AppError::Persistence(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (invoice_id, item_id, description, quantity,
                    unit_measure, unit_price, discount_pct, discount_amount, tax_rate,
                    tax_amount, line_subtotal, line_total, product_code, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(created.invoice_id)
            .bind(item.item_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(&item.unit_measure)
            .bind(item.unit_price)
            .bind(item.discount_pct)
            .bind(item.discount_amount)
            .bind(item.tax_rate)
            .bind(item.tax_amount)
            .bind(item.line_subtotal)
            .bind(item.line_total)
            .bind(&item.product_code)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to insert item: {}", e)))?;
        }

        sqlx::query(
            r#"
            INSERT INTO events (invoice_id, event_type, payload, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(created.invoice_id)
        .bind("INVOICE_CREATED")
        .bind(&event_payload)
        .bind("COMPLETED")
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to append event: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::Persistence(anyhow::anyhow!("Failed to commit invoice: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %created.invoice_id, "Invoice created");

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, reference))]
    async fn find_invoice(&self, reference: &InvoiceRef) -> Result<Option<Invoice>, AppError> {
        if let Some(cufe) = &reference.cufe {
            if let Some(invoice) = self.fetch_by_column("cufe", cufe).await? {
                return Ok(Some(invoice));
            }
        }
        if let Some(invoice_id) = reference.invoice_id {
            if let Some(invoice) = self.get_invoice(invoice_id).await? {
                return Ok(Some(invoice));
            }
        }
        if let Some(dian_uuid) = &reference.dian_uuid {
            if let Some(invoice) = self.fetch_by_column("dian_uuid", dian_uuid).await? {
                return Ok(Some(invoice));
            }
        }
        Ok(None)
    }

    #[instrument(skip(self))]
    async fn get_items(&self, invoice_id: i64) -> Result<Vec<InvoiceItem>, AppError> {
        sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT item_row_id, invoice_id, item_id, description, quantity, unit_measure,
                   unit_price, discount_pct, discount_amount, tax_rate, tax_amount,
                   line_subtotal, line_total, product_code, notes, created_at
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY item_row_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to list items: {}", e)))
    }

    #[instrument(skip(self, event), fields(invoice_id = %event.invoice_id, event_type = event.event_type.as_str()))]
    async fn append_event(&self, event: NewEvent) -> Result<InvoiceEvent, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_event"])
            .start_timer();

        let stored = sqlx::query_as::<_, InvoiceEvent>(
            r#"
            INSERT INTO events (invoice_id, event_type, payload, status)
            VALUES ($1, $2, $3, $4)
            RETURNING event_id, invoice_id, event_type, payload, status, created_at
            "#,
        )
        .bind(event.invoice_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to append event: {}", e)))?;

        timer.observe_duration();

        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn list_events(&self, invoice_id: i64) -> Result<Vec<InvoiceEvent>, AppError> {
        sqlx::query_as::<_, InvoiceEvent>(
            r#"
            SELECT event_id, invoice_id, event_type, payload, status, created_at
            FROM events
            WHERE invoice_id = $1
            ORDER BY created_at DESC, event_id DESC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to list events: {}", e)))
    }

    #[instrument(skip(self, from, to, stamp, event), fields(from = from.as_str(), to = to.as_str()))]
    async fn transition_status(
        &self,
        invoice_id: i64,
        from: InvoiceStatus,
        to: InvoiceStatus,
        stamp: Option<&AuthorityStamp>,
        event: NewEvent,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_status"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::Persistence(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let (cufe, dian_uuid) = match stamp {
            Some(stamp) => (stamp.cufe.clone(), stamp.dian_uuid.clone()),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3,
                cufe = COALESCE($4, cufe),
                dian_uuid = COALESCE($5, dian_uuid),
                updated_at = NOW()
            WHERE invoice_id = $1 AND status = $2
            "#,
        )
        .bind(invoice_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(cufe)
        .bind(dian_uuid)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to update status: {}", e)))?;

        if result.rows_affected() == 0 {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO events (invoice_id, event_type, payload, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.invoice_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to append event: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::Persistence(anyhow::anyhow!("Failed to commit transition: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id, from = from.as_str(), to = to.as_str(), "Invoice status updated");

        Ok(true)
    }

    #[instrument(skip(self, url))]
    async fn set_xml_url(&self, invoice_id: i64, url: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE invoices SET xml_url = $2, updated_at = NOW() WHERE invoice_id = $1")
            .bind(invoice_id)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to set xml_url: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self, url))]
    async fn set_pdf_url(&self, invoice_id: i64, url: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE invoices SET pdf_url = $2, updated_at = NOW() WHERE invoice_id = $1")
            .bind(invoice_id)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to set pdf_url: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_customer(&self, customer_id: i64) -> Result<Option<Customer>, AppError> {
        sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, tax_id, business_name, address, city, state, postal_code,
                   country_code, email, phone
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to get customer: {}", e)))
    }

    #[instrument(skip(self))]
    async fn get_organization(&self) -> Result<Option<Organization>, AppError> {
        sqlx::query_as::<_, Organization>(
            r#"
            SELECT organization_id, tax_id, business_name, address, city, state, postal_code,
                   country_code, email, phone
            FROM organizations
            ORDER BY organization_id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Persistence(anyhow::anyhow!("Failed to get organization: {}", e)))
    }
}
