mod config;
mod grammar;
mod layout;
mod money;
mod pdf_text;
mod pipeline;
mod recon;
mod store;

use std::env;
use std::fs;
use std::path::Path;

use store::ReportStore;
use tracing::info;

const CONFIG_PATH: &str = ".config/stocktake.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    let cfg = config::Config::load(CONFIG_PATH)?;
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("ingest") => {
            let file = args.get(2).ok_or(USAGE)?;
            let location = location_arg(&args, 3, &cfg)?;
            let date = args.get(4).cloned().unwrap_or_else(today);
            let bytes = fs::read(file)?;

            let mut db = ReportStore::new(&cfg.db_path)?;
            let n = pipeline::ingest_pdf(&mut db, &location, &date, &file_name(file), &bytes)?;
            config::Config::update_last_location(CONFIG_PATH, &location)?;
            info!(records = n, location = %location, date = %date, "Ingest complete");
        }
        Some("ingest-text") => {
            let file = args.get(2).ok_or(USAGE)?;
            let location = location_arg(&args, 3, &cfg)?;
            let date = args.get(4).cloned().unwrap_or_else(today);
            let text = fs::read_to_string(file)?;

            let mut db = ReportStore::new(&cfg.db_path)?;
            let n = pipeline::ingest_text(&mut db, &location, &date, &file_name(file), &text)?;
            config::Config::update_last_location(CONFIG_PATH, &location)?;
            info!(records = n, location = %location, date = %date, "Ingest complete");
        }
        Some("ingest-fragments") => {
            let file = args.get(2).ok_or(USAGE)?;
            let location = location_arg(&args, 3, &cfg)?;
            let date = args.get(4).cloned().unwrap_or_else(today);
            let json = fs::read_to_string(file)?;

            let mut db = ReportStore::new(&cfg.db_path)?;
            let n = pipeline::ingest_fragments(
                &mut db,
                &location,
                &date,
                &file_name(file),
                &json,
                cfg.layout_tolerance,
            )?;
            config::Config::update_last_location(CONFIG_PATH, &location)?;
            info!(records = n, location = %location, date = %date, "Ingest complete");
        }
        Some("load") => {
            // load <assignments|transit|list:NAME> <json> [location] [date]
            let target = args.get(2).ok_or(USAGE)?.clone();
            let file = args.get(3).ok_or(USAGE)?;
            let location = location_arg(&args, 4, &cfg)?;
            let date = args.get(5).cloned().unwrap_or_else(today);

            let rows: Vec<recon::SourceRow> = serde_json::from_str(&fs::read_to_string(file)?)?;
            let mut db = ReportStore::new(&cfg.db_path)?;
            match target.as_str() {
                "assignments" => db.load_assignments(&location, &date, &rows)?,
                "transit" => db.load_transit(&location, &rows)?,
                other => match other.strip_prefix("list:") {
                    Some(name) if !name.is_empty() => {
                        db.replace_custom_list(&location, name, &rows)?
                    }
                    _ => return Err(USAGE.into()),
                },
            }
            info!(target = %target, rows = rows.len(), location = %location, "Source loaded");
        }
        Some("report") => {
            let location = location_arg(&args, 2, &cfg)?;
            let date = args.get(3).cloned().unwrap_or_else(today);

            let reports = pipeline::build_reports(&cfg.db_path, &location, &date).await?;
            for report in &reports {
                info!(
                    id = %report.id,
                    items = report.item_count,
                    units = report.sum_absolute_units,
                    value = report.total_value,
                    "Report built"
                );
            }
            // the rendering/export collaborators consume this shape
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Some("stats") => {
            let db = ReportStore::new(&cfg.db_path)?;
            let (documents, exhausted, records) = db.get_counts()?;
            info!(
                documents_total = documents,
                documents_exhausted = exhausted,
                records_total = records,
                "Database statistics"
            );
        }
        _ => {
            eprintln!("{USAGE}");
        }
    }

    Ok(())
}

const USAGE: &str = "usage: stocktake <command>
  ingest <pdf> [location] [date]            parse a PDF inventory report
  ingest-text <txt> [location] [date]       parse a raw text block (manual entry)
  ingest-fragments <json> [location] [date] parse a positioned-fragment dump
  load <assignments|transit|list:NAME> <json> [location] [date]
  report [location] [date]                  reconcile and print reports as JSON
  stats                                     database statistics";

/// Location from the argument list, falling back to the config's last one.
fn location_arg(
    args: &[String],
    idx: usize,
    cfg: &config::Config,
) -> Result<String, Box<dyn std::error::Error>> {
    args.get(idx)
        .cloned()
        .or_else(|| cfg.last_location.clone())
        .ok_or_else(|| "no location given and none remembered in config".into())
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn today() -> String {
    let d = time::OffsetDateTime::now_utc().date();
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}
