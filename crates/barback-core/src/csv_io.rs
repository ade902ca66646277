//! # CSV Import / Export
//!
//! Product lists come in and go out as CSV; sales go out only.
//!
//! ## Product Columns
//! ```text
//! name,category,price,cost,quantity,unit,par_level,sku
//! Negroni Gin,Spirits,42.00,28.50,3.5,bottle,2,GIN-01
//! ```
//!
//! The header row is required, column order is free, unknown columns are
//! ignored. Only `name` is mandatory. Prices are decimal dollars and are
//! parsed exactly with [`Money::parse`]. A bad row is reported with its
//! line number and the rest of the file still imports.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Product, SaleRecord};
use crate::validation;

pub const PRODUCT_COLUMNS: [&str; 8] = ["name", "category", "price", "cost", "quantity", "unit", "par_level", "sku"];

/// One valid product row, ready to upsert by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductImportRow {
    pub line: u64,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub quantity: f64,
    pub unit: String,
    pub par_level: Option<f64>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ImportError {
    /// 1-based line in the file, header is line 1.
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ImportParse {
    pub rows: Vec<ProductImportRow>,
    pub errors: Vec<ImportError>,
}

struct Columns {
    name: usize,
    category: Option<usize>,
    price: Option<usize>,
    cost: Option<usize>,
    quantity: Option<usize>,
    unit: Option<usize>,
    par_level: Option<usize>,
    sku: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> CoreResult<Self> {
        let find = |col: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(col) || h.trim().replace(' ', "_").eq_ignore_ascii_case(col))
        };
        let name = find("name").ok_or_else(|| CoreError::Csv("missing required column: name".to_string()))?;
        Ok(Columns {
            name,
            category: find("category"),
            price: find("price"),
            cost: find("cost"),
            quantity: find("quantity"),
            unit: find("unit"),
            par_level: find("par_level"),
            sku: find("sku"),
        })
    }
}

fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).map(str::trim).unwrap_or("")
}

fn parse_money(field: &str, raw: &str) -> Result<i64, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    let money = Money::parse(raw).map_err(|_| format!("{field}: invalid amount {raw:?}"))?;
    validation::validate_price_cents(field, money.cents()).map_err(|e| e.to_string())?;
    Ok(money.cents())
}

fn parse_number(field: &str, raw: &str) -> Result<Option<f64>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value: f64 = raw.parse().map_err(|_| format!("{field}: invalid number {raw:?}"))?;
    validation::validate_stock_quantity(field, value).map_err(|e| e.to_string())?;
    Ok(Some(value))
}

fn parse_row(cols: &Columns, record: &csv::StringRecord, line: u64) -> Result<ProductImportRow, String> {
    let name = validation::validate_product_name(cell(record, Some(cols.name))).map_err(|e| e.to_string())?;
    let par_level = parse_number("par_level", cell(record, cols.par_level))?;
    if let Some(par) = par_level {
        validation::validate_non_negative("par_level", par).map_err(|e| e.to_string())?;
    }
    let sku = cell(record, cols.sku);

    Ok(ProductImportRow {
        line,
        name,
        category: validation::validate_category(cell(record, cols.category)).map_err(|e| e.to_string())?,
        price_cents: parse_money("price", cell(record, cols.price))?,
        cost_cents: parse_money("cost", cell(record, cols.cost))?,
        quantity: parse_number("quantity", cell(record, cols.quantity))?.unwrap_or(0.0),
        unit: validation::validate_unit(cell(record, cols.unit)).map_err(|e| e.to_string())?,
        par_level,
        sku: (!sku.is_empty()).then(|| sku.to_string()),
    })
}

/// Parses a product CSV.
///
/// Fails only when the header is unreadable or has no `name` column.
///
/// ## Example
/// ```rust
/// use barback_core::csv_io::parse_products_csv;
///
/// let csv = "name,price,quantity\nLager,7.00,24\n,5,1\n";
/// let parsed = parse_products_csv(csv.as_bytes()).unwrap();
/// assert_eq!(parsed.rows.len(), 1);
/// assert_eq!(parsed.rows[0].price_cents, 700);
/// assert_eq!(parsed.errors[0].line, 3);
/// ```
pub fn parse_products_csv(bytes: &[u8]) -> CoreResult<ImportParse> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let cols = Columns::from_headers(reader.headers()?)?;
    let mut parsed = ImportParse::default();

    for (idx, result) in reader.records().enumerate() {
        let fallback_line = idx as u64 + 2;
        match result {
            Ok(record) => {
                if record.iter().all(|c| c.trim().is_empty()) {
                    continue;
                }
                let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
                match parse_row(&cols, &record, line) {
                    Ok(row) => parsed.rows.push(row),
                    Err(message) => parsed.errors.push(ImportError { line, message }),
                }
            }
            Err(e) => parsed.errors.push(ImportError {
                line: e.position().map(|p| p.line()).unwrap_or(fallback_line),
                message: e.to_string(),
            }),
        }
    }

    Ok(parsed)
}

/// `1234` → `"12.34"`, plain so the file re-imports cleanly.
fn dollars(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, cents.unsigned_abs() / 100, cents.unsigned_abs() % 100)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> CoreResult<String> {
    let bytes = writer.into_inner().map_err(|e| CoreError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Csv(e.to_string()))
}

/// Writes active products in [`PRODUCT_COLUMNS`] order.
pub fn write_products_csv(products: &[Product]) -> CoreResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(PRODUCT_COLUMNS)?;

    for p in products.iter().filter(|p| p.is_active) {
        writer.write_record([
            p.name.clone(),
            p.category.clone(),
            dollars(p.price_cents),
            dollars(p.cost_cents),
            p.quantity.to_string(),
            p.unit.clone(),
            p.par_level.map(|v| v.to_string()).unwrap_or_default(),
            p.sku.clone().unwrap_or_default(),
        ])?;
    }

    finish(writer)
}

/// Writes one row per sold line.
pub fn write_sales_csv(records: &[SaleRecord]) -> CoreResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "receipt_number",
        "sold_at",
        "kind",
        "item_id",
        "name",
        "category",
        "quantity",
        "unit_price",
        "unit_cost",
        "line_total",
        "profit",
    ])?;

    for r in records {
        writer.write_record([
            r.receipt_number.clone(),
            r.sold_at.to_rfc3339(),
            r.kind.as_str().to_string(),
            r.item_id.clone(),
            r.name.clone(),
            r.category.clone(),
            r.quantity.to_string(),
            dollars(r.unit_price_cents),
            dollars(r.unit_cost_cents),
            dollars(r.line_total_cents),
            dollars(r.profit_cents()),
        ])?;
    }

    finish(writer)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_any_column_order() {
        let csv = "sku,Quantity,name,price,cost,unit,par level,category,notes\n\
                   GIN-01,3.5,Gin,$42.00,28.5,bottle,2,Spirits,ignored\n";
        let parsed = parse_products_csv(csv.as_bytes()).unwrap();
        assert!(parsed.errors.is_empty());

        let row = &parsed.rows[0];
        assert_eq!(row.line, 2);
        assert_eq!(row.name, "Gin");
        assert_eq!(row.category, "Spirits");
        assert_eq!(row.price_cents, 4200);
        assert_eq!(row.cost_cents, 2850);
        assert_eq!(row.quantity, 3.5);
        assert_eq!(row.unit, "bottle");
        assert_eq!(row.par_level, Some(2.0));
        assert_eq!(row.sku.as_deref(), Some("GIN-01"));
    }

    #[test]
    fn test_bad_rows_are_reported_not_fatal() {
        let csv = "name,price,quantity,par_level\n\
                   Lager,7,24,\n\
                   Stout,seven,10,\n\
                   Cider,6,abc,\n\
                   ,5,1,\n\
                   \n\
                   Wine,1.005,1,\n\
                   Rum,30,2,-1\n\
                   Soda,2.50,,\n";
        let parsed = parse_products_csv(csv.as_bytes()).unwrap();

        let names: Vec<_> = parsed.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Lager", "Soda"]);
        assert_eq!(parsed.rows[1].quantity, 0.0);
        assert_eq!(parsed.rows[0].unit, "unit");

        let lines: Vec<_> = parsed.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5, 7, 8]);
    }

    #[test]
    fn test_missing_name_column_is_fatal() {
        let err = parse_products_csv(b"title,price\nLager,7\n").unwrap_err();
        assert!(matches!(err, CoreError::Csv(_)));
    }

    #[test]
    fn test_dollars() {
        assert_eq!(dollars(1234), "12.34");
        assert_eq!(dollars(5), "0.05");
        assert_eq!(dollars(-250), "-2.50");
    }

    fn product(name: &str, active: bool) -> Product {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            id: name.to_lowercase(),
            owner_id: "owner".to_string(),
            name: name.to_string(),
            category: "Beer, Draft".to_string(),
            price_cents: 750,
            cost_cents: 210,
            quantity: 12.5,
            unit: "pint".to_string(),
            par_level: None,
            sku: Some("IPA-1".to_string()),
            is_active: active,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn test_products_export_reimports() {
        let out = write_products_csv(&[product("IPA", true), product("Retired", false)]).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("name,category,price,cost,quantity,unit,par_level,sku"));
        assert_eq!(lines.next(), Some("IPA,\"Beer, Draft\",7.50,2.10,12.5,pint,,IPA-1"));
        assert_eq!(lines.next(), None);

        let parsed = parse_products_csv(out.as_bytes()).unwrap();
        assert_eq!(parsed.rows[0].category, "Beer, Draft");
        assert_eq!(parsed.rows[0].price_cents, 750);
    }

    #[test]
    fn test_sales_export() {
        let record = SaleRecord {
            sale_id: "s1".to_string(),
            receipt_number: "R-000001".to_string(),
            kind: ItemKind::Recipe,
            item_id: "negroni".to_string(),
            name: "Negroni".to_string(),
            category: "Cocktails".to_string(),
            quantity: 2,
            unit_price_cents: 1200,
            unit_cost_cents: 350,
            line_total_cents: 2400,
            sold_at: Utc.with_ymd_and_hms(2024, 3, 15, 21, 30, 0).unwrap(),
        };
        let out = write_sales_csv(&[record]).unwrap();
        let row = out.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "R-000001,2024-03-15T21:30:00+00:00,recipe,negroni,Negroni,Cocktails,2,12.00,3.50,24.00,17.00"
        );
    }
}
