// src/store.rs

use rusqlite::{Connection, Result as SqliteResult, params};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::grammar::ParsedRecord;
use crate::recon::{PriceCatalog, SourceRow};

pub struct ReportStore {
    conn: Connection,
}

/// One ingested document and its parse status.
#[derive(Debug)]
pub struct StoredDocument {
    pub uid: String,
    pub location: String,
    pub report_date: String,
    pub filename: String,
    /// "parsed", "exhausted", "scanned" or "error".
    pub status: String,
    /// Original text, retained verbatim so exhausted documents can be
    /// recovered manually.
    pub raw_text: Option<String>,
}

impl ReportStore {
    /// Open (and initialize) the SQLite-backed store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                uid TEXT PRIMARY KEY,
                location TEXT NOT NULL,
                report_date TEXT NOT NULL,
                filename TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                raw_text TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // parsed records, overwritten wholesale per document
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_uid TEXT NOT NULL,
                location TEXT NOT NULL,
                report_date TEXT NOT NULL,
                position INTEGER NOT NULL,
                kind TEXT NOT NULL,
                code TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                family TEXT,
                units INTEGER NOT NULL DEFAULT 0,
                unit_price INTEGER,
                FOREIGN KEY (document_uid) REFERENCES documents(uid) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS catalog (
                location TEXT NOT NULL,
                code TEXT NOT NULL,
                unit_price INTEGER NOT NULL,
                PRIMARY KEY (location, code)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT NOT NULL,
                report_date TEXT NOT NULL,
                position INTEGER NOT NULL,
                code TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                delta INTEGER NOT NULL DEFAULT 0,
                unit_price INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT NOT NULL,
                position INTEGER NOT NULL,
                code TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                quantity INTEGER NOT NULL DEFAULT 0,
                unit_price INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS custom_lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT NOT NULL,
                list_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                code TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                units INTEGER NOT NULL DEFAULT 0,
                unit_price INTEGER,
                subtotal INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_location ON documents(location, report_date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_location ON records(location, report_date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_custom_lists_location ON custom_lists(location, list_name)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Generate a document uid from location, report date, and filename.
    pub fn generate_uid(location: &str, report_date: &str, filename: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(location.as_bytes());
        hasher.update(report_date.as_bytes());
        hasher.update(filename.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Insert or update a document (single-document overwrite semantics).
    pub fn upsert_document(&self, doc: &StoredDocument) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO documents (uid, location, report_date, filename, status, raw_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uid) DO UPDATE SET
                status = excluded.status,
                raw_text = excluded.raw_text",
            params![
                doc.uid,
                doc.location,
                doc.report_date,
                doc.filename,
                doc.status,
                doc.raw_text,
            ],
        )?;
        info!(uid = %doc.uid, status = %doc.status, "Document stored");
        Ok(())
    }

    pub fn get_document(&self, uid: &str) -> SqliteResult<Option<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, location, report_date, filename, status, raw_text
             FROM documents WHERE uid = ?1",
        )?;
        let mut rows = stmt.query(params![uid])?;
        match rows.next()? {
            Some(row) => Ok(Some(StoredDocument {
                uid: row.get(0)?,
                location: row.get(1)?,
                report_date: row.get(2)?,
                filename: row.get(3)?,
                status: row.get(4)?,
                raw_text: row.get(5)?,
            })),
            None => Ok(None),
        }
    }

    /// Replace a document's record set in source order. Catalog entries
    /// also refresh the location's price catalog, so ingesting a price
    /// list updates the prices every later reconciliation joins against.
    pub fn replace_records(
        &mut self,
        doc: &StoredDocument,
        records: &[ParsedRecord],
    ) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE document_uid = ?1",
            params![doc.uid],
        )?;

        for (position, rec) in records.iter().enumerate() {
            let (kind, code, name, family, units, unit_price) = match rec {
                ParsedRecord::Catalog {
                    code,
                    name,
                    family,
                    unit_price,
                } => (
                    "catalog",
                    code,
                    name,
                    Some(family.as_str()),
                    0i64,
                    Some(*unit_price),
                ),
                ParsedRecord::Count {
                    code,
                    name,
                    quantity,
                } => ("count", code, name, None, *quantity, None),
                ParsedRecord::Assignment { code, name, delta } => {
                    ("assignment", code, name, None, *delta, None)
                }
                ParsedRecord::Transit {
                    code,
                    name,
                    quantity,
                    unit_price,
                } => ("transit", code, name, None, *quantity, *unit_price),
            };

            tx.execute(
                "INSERT INTO records
                    (document_uid, location, report_date, position, kind, code, name, family, units, unit_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    doc.uid,
                    doc.location,
                    doc.report_date,
                    position as i64,
                    kind,
                    code,
                    name,
                    family,
                    units,
                    unit_price,
                ],
            )?;

            if let ParsedRecord::Catalog {
                code, unit_price, ..
            } = rec
            {
                tx.execute(
                    "INSERT OR REPLACE INTO catalog (location, code, unit_price)
                     VALUES (?1, ?2, ?3)",
                    params![doc.location, code, unit_price],
                )?;
            }
        }

        tx.commit()?;
        info!(uid = %doc.uid, records = records.len(), "Record set replaced");
        Ok(())
    }

    pub fn fetch_catalog(&self, location: &str) -> SqliteResult<PriceCatalog> {
        let mut stmt = self
            .conn
            .prepare("SELECT code, unit_price FROM catalog WHERE location = ?1")?;
        let rows = stmt.query_map(params![location], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        rows.collect()
    }

    /// Count records parsed at a location/date, in document order.
    pub fn fetch_counts(&self, location: &str, report_date: &str) -> SqliteResult<Vec<SourceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, units, unit_price FROM records
             WHERE location = ?1 AND report_date = ?2 AND kind = 'count'
             ORDER BY document_uid, position",
        )?;
        let rows = stmt.query_map(params![location, report_date], Self::row_to_source)?;
        rows.collect()
    }

    pub fn fetch_assignments(
        &self,
        location: &str,
        report_date: &str,
    ) -> SqliteResult<Vec<SourceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, delta, unit_price FROM assignments
             WHERE location = ?1 AND report_date = ?2
             ORDER BY position",
        )?;
        let rows = stmt.query_map(params![location, report_date], Self::row_to_source)?;
        rows.collect()
    }

    pub fn fetch_transit(&self, location: &str) -> SqliteResult<Vec<SourceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, quantity, unit_price FROM transit
             WHERE location = ?1
             ORDER BY position",
        )?;
        let rows = stmt.query_map(params![location], Self::row_to_source)?;
        rows.collect()
    }

    pub fn fetch_custom_lists(
        &self,
        location: &str,
    ) -> SqliteResult<Vec<(String, Vec<SourceRow>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT list_name, code, name, units, unit_price, subtotal FROM custom_lists
             WHERE location = ?1
             ORDER BY list_name, position",
        )?;
        let rows = stmt.query_map(params![location], |row| {
            let list: String = row.get(0)?;
            let mut src = SourceRow {
                code: row.get(1)?,
                name: row.get(2)?,
                units: Value::from(row.get::<_, i64>(3)?),
                ..SourceRow::default()
            };
            src.unit_price = opt_value(row.get::<_, Option<i64>>(4)?);
            src.subtotal = opt_value(row.get::<_, Option<i64>>(5)?);
            Ok((list, src))
        })?;

        let mut lists: Vec<(String, Vec<SourceRow>)> = Vec::new();
        for entry in rows {
            let (list, src) = entry?;
            if let Some((name, bucket)) = lists.last_mut() {
                if *name == list {
                    bucket.push(src);
                    continue;
                }
            }
            lists.push((list, vec![src]));
        }
        Ok(lists)
    }

    /// Replace a location/date's assignment deltas.
    pub fn load_assignments(
        &mut self,
        location: &str,
        report_date: &str,
        rows: &[SourceRow],
    ) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM assignments WHERE location = ?1 AND report_date = ?2",
            params![location, report_date],
        )?;
        for (position, row) in rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO assignments (location, report_date, position, code, name, delta, unit_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    location,
                    report_date,
                    position as i64,
                    row.code,
                    row.name,
                    crate::money::normalize_value(&row.units),
                    int_or_null(&row.unit_price),
                ],
            )?;
        }
        tx.commit()?;
        info!(location = %location, rows = rows.len(), "Assignments loaded");
        Ok(())
    }

    /// Replace a location's in-transit rows.
    pub fn load_transit(&mut self, location: &str, rows: &[SourceRow]) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM transit WHERE location = ?1", params![location])?;
        for (position, row) in rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO transit (location, position, code, name, quantity, unit_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    location,
                    position as i64,
                    row.code,
                    row.name,
                    crate::money::normalize_value(&row.units),
                    int_or_null(&row.unit_price),
                ],
            )?;
        }
        tx.commit()?;
        info!(location = %location, rows = rows.len(), "Transit rows loaded");
        Ok(())
    }

    /// Replace one named custom list for a location.
    pub fn replace_custom_list(
        &mut self,
        location: &str,
        list_name: &str,
        rows: &[SourceRow],
    ) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM custom_lists WHERE location = ?1 AND list_name = ?2",
            params![location, list_name],
        )?;
        for (position, row) in rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO custom_lists
                    (location, list_name, position, code, name, units, unit_price, subtotal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    location,
                    list_name,
                    position as i64,
                    row.code,
                    row.name,
                    crate::money::normalize_value(&row.units),
                    int_or_null(&row.unit_price),
                    int_or_null(&row.subtotal),
                ],
            )?;
        }
        tx.commit()?;
        info!(location = %location, list = %list_name, rows = rows.len(), "Custom list replaced");
        Ok(())
    }

    /// Document and record counts for the stats command.
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let documents: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let exhausted: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'exhausted'",
            [],
            |row| row.get(0),
        )?;
        let records: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok((documents, exhausted, records))
    }

    fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
        let mut src = SourceRow {
            code: row.get(0)?,
            name: row.get(1)?,
            units: Value::from(row.get::<_, i64>(2)?),
            ..SourceRow::default()
        };
        src.unit_price = opt_value(row.get::<_, Option<i64>>(3)?);
        Ok(src)
    }
}

fn opt_value(v: Option<i64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

fn int_or_null(v: &Value) -> Option<i64> {
    match v {
        Value::Null => None,
        other => Some(crate::money::normalize_value(other)),
    }
}
