//! Read-only party lookups referenced by invoices.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Customer receiving the invoice. Owned by the CRM side of the system;
/// the invoicing core only reads it to assemble render input.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: i64,
    pub tax_id: String,
    pub business_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Issuing organization. One row per installation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub organization_id: i64,
    pub tax_id: String,
    pub business_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}
