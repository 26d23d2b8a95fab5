// src/recon.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::grammar::normalize_code;
use crate::money;

/// Normalized product code → listed unit price for one location.
/// Built once per reconciliation run and immutable for its duration.
pub type PriceCatalog = HashMap<String, i64>;

/// One loosely-typed row from a persistence collaborator. Missing fields
/// default to empty/null; numeric fields may arrive as numbers or as
/// locale-formatted strings and are normalized on ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub units: Value,
    #[serde(default)]
    pub unit_price: Value,
    #[serde(default)]
    pub subtotal: Value,
}

/// One auditable report row. `units` is signed: negative is a shortage,
/// positive an overage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub code: String,
    pub name: String,
    pub units: i64,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub name: String,
    pub rows: Vec<ReportRow>,
    pub item_count: usize,
    pub sum_absolute_units: i64,
    pub total_value: i64,
}

impl Report {
    fn new(id: &str, name: &str, rows: Vec<ReportRow>) -> Self {
        let item_count = rows.len();
        let sum_absolute_units = rows.iter().map(|r| r.units.abs()).sum();
        let total_value = rows.iter().map(|r| r.subtotal).sum();
        Report {
            id: id.to_string(),
            name: name.to_string(),
            rows,
            item_count,
            sum_absolute_units,
            total_value,
        }
    }
}

/// All inputs to one reconciliation run. Optional sources are degraded to
/// empty sets upstream when their fetch fails; the engine itself is total
/// and never aborts.
#[derive(Debug, Default)]
pub struct ReconInputs {
    pub catalog: PriceCatalog,
    /// Count-sheet records; contribute product names to rows from sources
    /// that arrive nameless.
    pub counts: Vec<SourceRow>,
    /// Expected-vs-counted deltas; source of the difference-type reports.
    pub assignments: Vec<SourceRow>,
    pub transit: Vec<SourceRow>,
    pub custom_lists: Vec<(String, Vec<SourceRow>)>,
}

/// Join every source set against the price catalog and bucket the rows
/// into reports. Row order follows source order; the engine never sorts.
/// Running twice on identical inputs yields identical output.
pub fn reconcile(inputs: &ReconInputs) -> Vec<Report> {
    let names: HashMap<String, &str> = inputs
        .counts
        .iter()
        .map(|r| (normalize_code(&r.code), r.name.as_str()))
        .collect();

    let assignment_rows: Vec<ReportRow> = inputs
        .assignments
        .iter()
        .map(|r| build_row(r, &inputs.catalog, &names))
        .filter(|r| !r.code.is_empty())
        .collect();

    // zero-unit rows are excluded from difference-type reports but kept
    // in transit/custom reports
    let shortages: Vec<ReportRow> = assignment_rows
        .iter()
        .filter(|r| r.units < 0)
        .cloned()
        .collect();
    let overages: Vec<ReportRow> = assignment_rows
        .iter()
        .filter(|r| r.units > 0)
        .cloned()
        .collect();
    let differences: Vec<ReportRow> = assignment_rows
        .into_iter()
        .filter(|r| r.units != 0)
        .collect();

    let transit_rows: Vec<ReportRow> = inputs
        .transit
        .iter()
        .map(|r| build_row(r, &inputs.catalog, &names))
        .filter(|r| !r.code.is_empty())
        .collect();

    let mut reports = vec![
        Report::new("diferencias", "Diferencias", differences),
        Report::new("faltantes", "Faltantes", shortages),
        Report::new("sobrantes", "Sobrantes", overages),
        Report::new("transito", "En tránsito", transit_rows),
    ];

    for (list_name, rows) in &inputs.custom_lists {
        let rows: Vec<ReportRow> = rows
            .iter()
            .map(|r| build_row(r, &inputs.catalog, &names))
            .filter(|r| !r.code.is_empty())
            .collect();
        reports.push(Report::new(&slug(list_name), list_name, rows));
    }

    reports
}

fn build_row(
    src: &SourceRow,
    catalog: &PriceCatalog,
    names: &HashMap<String, &str>,
) -> ReportRow {
    let code = normalize_code(&src.code);
    let units = money::normalize_value(&src.units);

    // an explicit positive price on the row wins over the catalog;
    // a catalog miss is a zero price, never a join failure
    let explicit_price = money::normalize_value(&src.unit_price);
    let unit_price = if explicit_price > 0 {
        explicit_price
    } else {
        catalog.get(&code).copied().unwrap_or(0)
    };

    // pre-aggregated custom lists carry their own subtotal
    let explicit_subtotal = money::normalize_value(&src.subtotal);
    let subtotal = if explicit_subtotal != 0 {
        explicit_subtotal
    } else {
        units * unit_price
    };

    let name = if src.name.trim().is_empty() {
        names.get(&code).copied().unwrap_or("").to_string()
    } else {
        src.name.trim().to_string()
    };

    ReportRow {
        code,
        name,
        units,
        unit_price,
        subtotal,
    }
}

fn slug(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    cleaned.trim_matches('-').to_string()
}
