//! Invoice aggregate builder.
//!
//! Validates a creation request, computes line and header totals, and
//! persists the aggregate in DRAFT with its creation event.

use chrono::{NaiveDate, NaiveTime};
use facturacion_core::error::AppError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use tracing::instrument;

use super::store::InvoiceStore;
use crate::dtos::{CreateInvoiceItem, CreateInvoiceRequest};
use crate::models::{Invoice, NewInvoice, NewItem};

/// Default Colombian VAT rate applied at the invoice header.
fn default_vat_rate() -> Decimal {
    Decimal::new(19, 0)
}

/// Round a monetary amount to 2 decimal places. Applied only when an amount
/// is persisted; intermediate math keeps full precision.
fn to_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

#[derive(Debug)]
struct ValidatedHeader<'a> {
    customer_id: i64,
    series: &'a str,
    number: &'a str,
    issue_date: NaiveDate,
    issue_time: NaiveTime,
}

fn validate(request: &CreateInvoiceRequest) -> Result<ValidatedHeader<'_>, AppError> {
    let customer_id = request
        .customer_id
        .ok_or_else(|| AppError::Validation("customer_id is required".to_string()))?;
    let series = request
        .series
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("series is required".to_string()))?;
    let number = request
        .number
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("number is required".to_string()))?;
    let issue_date = request
        .issue_date
        .ok_or_else(|| AppError::Validation("issue_date is required".to_string()))?;
    let issue_time = request
        .issue_time
        .ok_or_else(|| AppError::Validation("issue_time is required".to_string()))?;
    if request.items.is_empty() {
        return Err(AppError::Validation(
            "items is required and cannot be empty".to_string(),
        ));
    }

    Ok(ValidatedHeader {
        customer_id,
        series,
        number,
        issue_date,
        issue_time,
    })
}

/// Header totals, full precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub line_extension_amount: Decimal,
    pub allowance_total_amount: Decimal,
    pub tax_exclusive_amount: Decimal,
    pub tax_amount: Decimal,
    pub tax_inclusive_amount: Decimal,
    pub charge_total_amount: Decimal,
    pub payable_amount: Decimal,
}

/// Compute line amounts and aggregate totals.
pub fn compute_lines(items: &[CreateInvoiceItem]) -> (InvoiceTotals, Vec<NewItem>) {
    let mut line_extension_amount = Decimal::ZERO;
    let mut allowance_total_amount = Decimal::ZERO;
    let mut tax_amount = Decimal::ZERO;

    let lines = items
        .iter()
        .map(|item| {
            let line_total = item.unit_price * item.quantity;
            let discount_amount = line_total * item.discount_pct / Decimal::ONE_HUNDRED;
            let taxable_amount = line_total - discount_amount;
            let item_tax = taxable_amount * item.tax_rate / Decimal::ONE_HUNDRED;

            line_extension_amount += line_total;
            allowance_total_amount += discount_amount;
            tax_amount += item_tax;

            NewItem {
                item_id: item.item_id,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_measure: item.unit_measure.clone(),
                unit_price: to_money(item.unit_price),
                discount_pct: item.discount_pct,
                discount_amount: to_money(discount_amount),
                tax_rate: item.tax_rate,
                tax_amount: to_money(item_tax),
                line_subtotal: to_money(line_total),
                line_total: to_money(taxable_amount + item_tax),
                product_code: item.product_code.clone(),
                notes: item.notes.clone(),
            }
        })
        .collect();

    let tax_exclusive_amount = line_extension_amount - allowance_total_amount;
    let tax_inclusive_amount = tax_exclusive_amount + tax_amount;
    let charge_total_amount = Decimal::ZERO;
    let payable_amount = tax_inclusive_amount + charge_total_amount;

    (
        InvoiceTotals {
            line_extension_amount,
            allowance_total_amount,
            tax_exclusive_amount,
            tax_amount,
            tax_inclusive_amount,
            charge_total_amount,
            payable_amount,
        },
        lines,
    )
}

/// Validate and persist a new invoice in DRAFT, appending `INVOICE_CREATED`.
#[instrument(skip(store, request), fields(series = request.series.as_deref().unwrap_or(""), number = request.number.as_deref().unwrap_or("")))]
pub async fn create_draft(
    store: &dyn InvoiceStore,
    request: &CreateInvoiceRequest,
) -> Result<Invoice, AppError> {
    let header = validate(request)?;

    if store.get_customer(header.customer_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Customer {} not found",
            header.customer_id
        )));
    }

    let (totals, lines) = compute_lines(&request.items);

    let new_invoice = NewInvoice {
        customer_id: header.customer_id,
        series: header.series.to_string(),
        number: header.number.to_string(),
        issue_date: header.issue_date,
        issue_time: header.issue_time,
        currency: request.currency.clone(),
        exchange_rate: request.exchange_rate,
        operation_type: request.operation_type.clone(),
        line_extension_amount: to_money(totals.line_extension_amount),
        tax_exclusive_amount: to_money(totals.tax_exclusive_amount),
        tax_inclusive_amount: to_money(totals.tax_inclusive_amount),
        allowance_total_amount: to_money(totals.allowance_total_amount),
        charge_total_amount: to_money(totals.charge_total_amount),
        payable_amount: to_money(totals.payable_amount),
        tax_amount: to_money(totals.tax_amount),
        tax_rate: default_vat_rate(),
        notes: request.notes.clone(),
    };

    let event_payload = json!({
        "series": header.series,
        "number": header.number,
        "customer_id": header.customer_id,
        "item_count": lines.len(),
    });

    store.create_invoice(new_invoice, lines, event_payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64, unit_price: i64, discount_pct: i64, tax_rate: i64) -> CreateInvoiceItem {
        CreateInvoiceItem {
            item_id: 1,
            description: "Test item".to_string(),
            quantity: Decimal::from(quantity),
            unit_measure: "94".to_string(),
            unit_price: Decimal::from(unit_price),
            discount_pct: Decimal::from(discount_pct),
            tax_rate: Decimal::from(tax_rate),
            product_code: None,
            notes: None,
        }
    }

    #[test]
    fn single_line_standard_vat() {
        let (totals, lines) = compute_lines(&[item(1, 100_000, 0, 19)]);

        assert_eq!(totals.line_extension_amount, Decimal::from(100_000));
        assert_eq!(totals.allowance_total_amount, Decimal::ZERO);
        assert_eq!(totals.tax_exclusive_amount, Decimal::from(100_000));
        assert_eq!(totals.tax_amount, Decimal::from(19_000));
        assert_eq!(totals.tax_inclusive_amount, Decimal::from(119_000));
        assert_eq!(totals.payable_amount, Decimal::from(119_000));

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tax_amount, to_money(Decimal::from(19_000)));
        assert_eq!(lines[0].line_total, to_money(Decimal::from(119_000)));
    }

    #[test]
    fn full_discount_produces_zero_tax() {
        let (totals, lines) = compute_lines(&[item(3, 5_000, 100, 19)]);

        assert_eq!(totals.line_extension_amount, Decimal::from(15_000));
        assert_eq!(totals.allowance_total_amount, Decimal::from(15_000));
        assert_eq!(totals.tax_exclusive_amount, Decimal::ZERO);
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.payable_amount, Decimal::ZERO);
        assert_eq!(lines[0].discount_amount, to_money(Decimal::from(15_000)));
    }

    #[test]
    fn zero_rate_line_carries_no_tax() {
        let (totals, _) = compute_lines(&[item(2, 1_000, 10, 0)]);

        assert_eq!(totals.line_extension_amount, Decimal::from(2_000));
        assert_eq!(totals.allowance_total_amount, Decimal::from(200));
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.payable_amount, Decimal::from(1_800));
    }

    #[test]
    fn totals_invariants_hold_across_rate_grid() {
        for discount in [0, 10, 25, 50, 100] {
            for tax in [0, 5, 19] {
                let (totals, _) = compute_lines(&[
                    item(2, 37_500, discount, tax),
                    item(1, 9_999, 0, 19),
                    item(4, 125, discount, 5),
                ]);

                assert_eq!(
                    totals.tax_exclusive_amount,
                    totals.line_extension_amount - totals.allowance_total_amount,
                    "tax_exclusive mismatch at discount={discount} tax={tax}"
                );
                assert_eq!(
                    totals.tax_inclusive_amount,
                    totals.tax_exclusive_amount + totals.tax_amount,
                    "tax_inclusive mismatch at discount={discount} tax={tax}"
                );
                assert_eq!(
                    totals.payable_amount,
                    totals.tax_inclusive_amount + totals.charge_total_amount,
                    "payable mismatch at discount={discount} tax={tax}"
                );
                assert!(totals.payable_amount >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn fractional_amounts_round_at_persistence_only() {
        // 3 * 33.33 = 99.99; 19% of 99.99 = 18.9981, stored as 19.00.
        let line = CreateInvoiceItem {
            item_id: 7,
            description: "Fractional".to_string(),
            quantity: Decimal::from(3),
            unit_measure: "94".to_string(),
            unit_price: Decimal::new(3333, 2),
            discount_pct: Decimal::ZERO,
            tax_rate: Decimal::from(19),
            product_code: None,
            notes: None,
        };
        let (totals, lines) = compute_lines(&[line]);

        assert_eq!(totals.tax_amount, Decimal::new(189_981, 4));
        assert_eq!(lines[0].tax_amount, Decimal::new(1900, 2));
        assert_eq!(to_money(totals.payable_amount), Decimal::new(11_899, 2));
    }

    #[test]
    fn validation_names_first_missing_field() {
        let mut request = CreateInvoiceRequest {
            customer_id: None,
            series: None,
            number: None,
            issue_date: None,
            issue_time: None,
            currency: "COP".to_string(),
            exchange_rate: Decimal::ONE,
            operation_type: "10".to_string(),
            notes: None,
            items: vec![],
        };

        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("customer_id"));

        request.customer_id = Some(1);
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("series"));

        request.series = Some("FE".to_string());
        let err = validate(&request).unwrap_err();
        assert!(err.to_string().contains("number"));
    }
}
