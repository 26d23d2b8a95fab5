// src/pipeline.rs

use tracing::{info, warn};

use crate::grammar;
use crate::layout::{self, PositionedFragment};
use crate::pdf_text::{self, PdfText};
use crate::recon::{self, ReconInputs, Report};
use crate::store::{ReportStore, StoredDocument};

/// Ingest a raw newline-delimited text block (the manual-entry path, and
/// the tail of the PDF path). Persists the parsed record set, or the raw
/// text under "exhausted" status when no grammar matched anything.
///
/// Returns the number of records stored. Parse exhaustion is the one
/// failure escalated to the caller.
pub fn ingest_text(
    store: &mut ReportStore,
    location: &str,
    report_date: &str,
    filename: &str,
    text: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let lines = grammar::lines_from_raw(text);
    parse_and_store(store, location, report_date, filename, &lines, text)
}

/// Ingest a positioned-fragment dump from the text-layer collaborator:
/// a JSON array of pages, each an array of `{text, x, y}` fragments.
pub fn ingest_fragments(
    store: &mut ReportStore,
    location: &str,
    report_date: &str,
    filename: &str,
    json: &str,
    tolerance: f64,
) -> Result<usize, Box<dyn std::error::Error>> {
    let pages: Vec<Vec<PositionedFragment>> = serde_json::from_str(json)?;
    let lines: Vec<String> = layout::reconstruct_document(&pages, tolerance)
        .into_iter()
        .map(|l| l.text)
        .collect();
    let raw_text = lines.join("\n");
    parse_and_store(store, location, report_date, filename, &lines, &raw_text)
}

/// Ingest a PDF report: classify and extract its text layer, then parse.
/// Scanned PDFs are recorded and skipped — OCR is out of scope.
pub fn ingest_pdf(
    store: &mut ReportStore,
    location: &str,
    report_date: &str,
    filename: &str,
    pdf_bytes: &[u8],
) -> Result<usize, Box<dyn std::error::Error>> {
    let span = tracing::info_span!("pdf", filename = %filename);
    let _guard = span.enter();

    match pdf_text::extract(pdf_bytes) {
        PdfText::Extracted(text) => ingest_text(store, location, report_date, filename, &text),
        PdfText::Scanned => {
            info!("PDF is scanned — needs OCR, recording and skipping");
            store.upsert_document(&document(
                location,
                report_date,
                filename,
                "scanned",
                None,
            ))?;
            Ok(0)
        }
        PdfText::Broken(e) => {
            store.upsert_document(&document(location, report_date, filename, "error", None))?;
            Err(e.into())
        }
    }
}

fn parse_and_store(
    store: &mut ReportStore,
    location: &str,
    report_date: &str,
    filename: &str,
    lines: &[String],
    raw_text: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    match grammar::parse_lines(lines) {
        Ok(outcome) => {
            let doc = document(
                location,
                report_date,
                filename,
                "parsed",
                Some(raw_text.to_string()),
            );
            store.upsert_document(&doc)?;
            store.replace_records(&doc, &outcome.records)?;
            info!(
                records = outcome.records.len(),
                unmatched_lines = outcome.unmatched_lines,
                "Document parsed"
            );
            Ok(outcome.records.len())
        }
        Err(exhausted) => {
            // keep the original text verbatim so a human can recover it
            warn!("Parse exhausted — no grammar matched any line");
            store.upsert_document(&document(
                location,
                report_date,
                filename,
                "exhausted",
                Some(raw_text.to_string()),
            ))?;
            Err(Box::new(exhausted))
        }
    }
}

fn document(
    location: &str,
    report_date: &str,
    filename: &str,
    status: &str,
    raw_text: Option<String>,
) -> StoredDocument {
    StoredDocument {
        uid: ReportStore::generate_uid(location, report_date, filename),
        location: location.to_string(),
        report_date: report_date.to_string(),
        filename: filename.to_string(),
        status: status.to_string(),
        raw_text,
    }
}

/// Run one reconciliation for a location/date.
///
/// The five inputs have no data dependency on each other, so they are
/// fetched concurrently, each on its own connection. A failed fetch
/// degrades that source to an empty set — reconciliation always produces
/// a total result, and the degradation is visible only in the log.
pub async fn build_reports(
    db_path: &str,
    location: &str,
    report_date: &str,
) -> Result<Vec<Report>, Box<dyn std::error::Error>> {
    let (catalog, counts, assignments, transit, custom_lists) = tokio::join!(
        fetch(db_path, location, report_date, |s, loc, _| s.fetch_catalog(loc)),
        fetch(db_path, location, report_date, |s, loc, date| s.fetch_counts(loc, date)),
        fetch(db_path, location, report_date, |s, loc, date| {
            s.fetch_assignments(loc, date)
        }),
        fetch(db_path, location, report_date, |s, loc, _| s.fetch_transit(loc)),
        fetch(db_path, location, report_date, |s, loc, _| {
            s.fetch_custom_lists(loc)
        }),
    );

    let inputs = ReconInputs {
        catalog: degrade("catalog", catalog),
        counts: degrade("counts", counts),
        assignments: degrade("assignments", assignments),
        transit: degrade("transit", transit),
        custom_lists: degrade("custom_lists", custom_lists),
    };

    info!(
        catalog = inputs.catalog.len(),
        counts = inputs.counts.len(),
        assignments = inputs.assignments.len(),
        transit = inputs.transit.len(),
        custom_lists = inputs.custom_lists.len(),
        "Reconciliation inputs gathered"
    );

    Ok(recon::reconcile(&inputs))
}

async fn fetch<T, F>(
    db_path: &str,
    location: &str,
    report_date: &str,
    f: F,
) -> Result<Result<T, rusqlite::Error>, tokio::task::JoinError>
where
    T: Send + 'static,
    F: FnOnce(&ReportStore, &str, &str) -> Result<T, rusqlite::Error> + Send + 'static,
{
    let db_path = db_path.to_string();
    let location = location.to_string();
    let report_date = report_date.to_string();
    tokio::task::spawn_blocking(move || {
        let store = ReportStore::new(&db_path)?;
        f(&store, &location, &report_date)
    })
    .await
}

fn degrade<T: Default>(
    source: &str,
    joined: Result<Result<T, rusqlite::Error>, tokio::task::JoinError>,
) -> T {
    let flat = match joined {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    degrade_flat(source, flat)
}

fn degrade_flat<T: Default>(source: &str, result: Result<T, String>) -> T {
    match result {
        Ok(v) => v,
        Err(error) => {
            warn!(source = %source, error = %error, "Source unavailable — degrading to empty set");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recon::{PriceCatalog, SourceRow};
    use serde_json::json;
    use std::path::PathBuf;

    fn memory_store() -> ReportStore {
        ReportStore::new(":memory:").unwrap()
    }

    fn temp_db(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "stocktake-test-{}-{}.db",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_ingest_text_persists_records() {
        let mut store = memory_store();
        let n = ingest_text(
            &mut store,
            "farmacia-01",
            "2026-08-28",
            "precios.txt",
            "A001  Paracetamol 500mg  ANALGESICOS  $1.000\n",
        )
        .unwrap();
        assert_eq!(n, 1);
        let catalog = store.fetch_catalog("farmacia-01").unwrap();
        assert_eq!(catalog.get("A001"), Some(&1000));
    }

    #[test]
    fn test_ingest_exhausted_escalates_and_retains_text() {
        let mut store = memory_store();
        let raw = "linea sin sentido\notra linea\n";
        let err = ingest_text(&mut store, "farmacia-01", "2026-08-28", "basura.txt", raw)
            .unwrap_err();
        assert!(err.downcast_ref::<grammar::ParseExhausted>().is_some());

        let uid = ReportStore::generate_uid("farmacia-01", "2026-08-28", "basura.txt");
        let doc = store.get_document(&uid).unwrap().unwrap();
        assert_eq!(doc.status, "exhausted");
        assert_eq!(doc.raw_text.as_deref(), Some(raw));
    }

    #[test]
    fn test_ingest_fragments_reconstructs_lines() {
        let mut store = memory_store();
        // count-sheet pair delivered as unordered fragments
        let json = r#"[[
            {"text": "12", "x": 80.0, "y": 695.0},
            {"text": "AB1234", "x": 10.0, "y": 700.0},
            {"text": "Amoxicilina 500", "x": 10.0, "y": 694.0}
        ]]"#;
        let n = ingest_fragments(
            &mut store,
            "farmacia-01",
            "2026-08-28",
            "recuento.json",
            json,
            layout::Y_TOLERANCE,
        )
        .unwrap();
        assert_eq!(n, 1);
        let counts = store.fetch_counts("farmacia-01", "2026-08-28").unwrap();
        assert_eq!(counts[0].code, "AB1234");
        assert_eq!(crate::money::normalize_value(&counts[0].units), 12);
    }

    #[test]
    fn test_degrade_flat_yields_empty_set() {
        let degraded: PriceCatalog = degrade_flat("catalog", Err("db locked".to_string()));
        assert!(degraded.is_empty());
        let kept: Vec<SourceRow> = degrade_flat("transit", Ok(vec![SourceRow::default()]));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_unavailable_catalog_still_yields_total_report() {
        // catalog fetch failed and degraded to empty: every lookup misses
        // and prices are zero, but the report is complete
        let inputs = ReconInputs {
            catalog: degrade_flat("catalog", Err("no such table".to_string())),
            assignments: vec![SourceRow {
                code: "A001".to_string(),
                name: "Paracetamol".to_string(),
                units: json!(-3),
                ..SourceRow::default()
            }],
            ..ReconInputs::default()
        };
        let reports = recon::reconcile(&inputs);
        let diff = reports.iter().find(|r| r.id == "diferencias").unwrap();
        assert_eq!(diff.item_count, 1);
        assert_eq!(diff.rows[0].unit_price, 0);
        assert_eq!(diff.rows[0].subtotal, 0);
    }

    #[tokio::test]
    async fn test_build_reports_end_to_end() {
        let path = temp_db("reports");
        let db_path = path.to_string_lossy().to_string();

        {
            let mut store = ReportStore::new(&db_path).unwrap();
            ingest_text(
                &mut store,
                "farmacia-01",
                "2026-08-28",
                "precios.txt",
                "A001  Paracetamol 500mg  ANALGESICOS  $1.000\n",
            )
            .unwrap();
            store
                .load_assignments(
                    "farmacia-01",
                    "2026-08-28",
                    &[SourceRow {
                        code: "A001".to_string(),
                        name: "Paracetamol 500mg".to_string(),
                        units: json!(-3),
                        ..SourceRow::default()
                    }],
                )
                .unwrap();
        }

        let reports = build_reports(&db_path, "farmacia-01", "2026-08-28")
            .await
            .unwrap();
        let diff = reports.iter().find(|r| r.id == "diferencias").unwrap();
        assert_eq!(diff.item_count, 1);
        assert_eq!(diff.rows[0].unit_price, 1000);
        assert_eq!(diff.rows[0].subtotal, -3000);
        assert_eq!(diff.sum_absolute_units, 3);

        let _ = std::fs::remove_file(&path);
    }
}
