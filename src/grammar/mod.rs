// src/grammar/mod.rs

mod count_sheet;
mod price_list;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// One typed record extracted from a document line (or line pair).
///
/// `code` is the canonical join key shared by every record kind — see
/// [`normalize_code`]. Records that reach the reconciliation engine never
/// carry an empty code; those are dropped here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedRecord {
    /// Price-list entry: one product with its family and listed unit price.
    Catalog {
        code: String,
        name: String,
        family: String,
        unit_price: i64,
    },
    /// Count-sheet entry: physically counted units of one product.
    Count {
        code: String,
        name: String,
        quantity: i64,
    },
    /// Assignment delta: expected-vs-counted difference, sign preserved.
    Assignment {
        code: String,
        name: String,
        delta: i64,
    },
    /// In-transit quantity, optionally with its own price.
    Transit {
        code: String,
        name: String,
        quantity: i64,
        unit_price: Option<i64>,
    },
}

impl ParsedRecord {
    pub fn code(&self) -> &str {
        match self {
            ParsedRecord::Catalog { code, .. }
            | ParsedRecord::Count { code, .. }
            | ParsedRecord::Assignment { code, .. }
            | ParsedRecord::Transit { code, .. } => code,
        }
    }
}

/// Canonical join key: trimmed, upper-cased, decorative suffix glyphs
/// stripped. Applied at every ingestion boundary so the engine only ever
/// sees one key format.
pub fn normalize_code(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['*', '°', '·'])
        .trim()
        .to_uppercase()
}

/// Header words the report layouts repeat on every page. A "code" equal to
/// one of these is layout furniture, not a product.
const BLOCKLIST: &[&str] = &[
    "SUCURSAL",
    "INFORME",
    "FARMACIA",
    "CODIGO",
    "INFORMACION",
    "PAGINA",
];

fn fold_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'Á' | 'á' => 'A',
            'É' | 'é' => 'E',
            'Í' | 'í' => 'I',
            'Ó' | 'ó' => 'O',
            'Ú' | 'ú' | 'Ü' | 'ü' => 'U',
            'Ñ' | 'ñ' => 'N',
            _ => c.to_ascii_uppercase(),
        })
        .collect()
}

pub fn is_blocklisted(code: &str) -> bool {
    BLOCKLIST.contains(&fold_diacritics(code).as_str())
}

/// Outcome of parsing one document's line sequence.
#[derive(Debug)]
pub struct ParseOutcome {
    pub records: Vec<ParsedRecord>,
    /// Lines that matched no grammar, kept for diagnostics.
    pub unmatched_lines: usize,
}

/// Zero records extracted from an entire document. Terminal for that
/// document; the raw text rides along so a human can recover the data.
#[derive(Debug)]
pub struct ParseExhausted {
    pub raw_text: String,
}

impl fmt::Display for ParseExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no records extracted from document ({} chars of raw text retained)",
            self.raw_text.len()
        )
    }
}

impl std::error::Error for ParseExhausted {}

/// What one grammar produced at a line position, and how many lines it ate.
/// A matcher may legitimately match and still yield no record (count-sheet
/// code lines that turn out to be headers).
struct MatchStep {
    records: Vec<ParsedRecord>,
    consumed: usize,
}

type Matcher = fn(&[String], usize) -> Option<MatchStep>;

/// Prioritized grammar chain, tried in order until one matches: single
/// price entry, multi-entry line recovery, paired-line count sheet.
const MATCHERS: &[Matcher] = &[
    price_list::match_single,
    price_list::match_multi,
    count_sheet::match_pair,
];

/// Split a raw newline-delimited block (manual-entry path, or pdf-extract
/// output) into the line sequence the grammars consume.
pub fn lines_from_raw(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Run the grammar chain over a document's full line sequence.
///
/// Per-line mismatches are skipped and counted, never surfaced one by one.
/// Blocklisted and empty codes are discarded post-match, independent of
/// which grammar produced them.
pub fn parse_lines(lines: &[String]) -> Result<ParseOutcome, ParseExhausted> {
    let mut records = Vec::new();
    let mut unmatched = 0usize;
    let mut i = 0;
    while i < lines.len() {
        match MATCHERS.iter().find_map(|m| m(lines, i)) {
            Some(step) => {
                for rec in step.records {
                    if rec.code().is_empty() {
                        continue;
                    }
                    if is_blocklisted(rec.code()) {
                        debug!(code = rec.code(), "blocklisted header token dropped");
                        continue;
                    }
                    records.push(rec);
                }
                i += step.consumed.max(1);
            }
            None => {
                unmatched += 1;
                i += 1;
            }
        }
    }

    if records.is_empty() {
        return Err(ParseExhausted {
            raw_text: lines.join("\n"),
        });
    }
    Ok(ParseOutcome {
        records,
        unmatched_lines: unmatched,
    })
}
