// src/grammar/price_list.rs

use super::{MatchStep, ParsedRecord, normalize_code};
use crate::money;
use regex::Regex;

/// Single-record price-list grammar: a leading alphanumeric code, a middle
/// name/family segment, and a trailing currency-formatted price.
///
///   `A001  Paracetamol 500mg  ANALGESICOS  $1.000`
pub(super) fn match_single(lines: &[String], i: usize) -> Option<MatchStep> {
    let record = parse_entry(lines.get(i)?)?;
    Some(MatchStep {
        records: vec![record],
        consumed: 1,
    })
}

/// Several price entries squeezed onto one physical line — a common layout
/// artifact. The line is cut immediately after each currency token and the
/// single-record grammar re-applied per piece; pieces that still fail are
/// dropped rather than failing the whole line.
pub(super) fn match_multi(lines: &[String], i: usize) -> Option<MatchStep> {
    let line = lines.get(i)?;
    let price = Regex::new(r"\$\s*\d[\d.,]*").ok()?;
    let cuts: Vec<usize> = price.find_iter(line).map(|m| m.end()).collect();
    if cuts.len() < 2 {
        return None;
    }

    let mut records = Vec::new();
    let mut start = 0;
    for end in cuts {
        if let Some(rec) = parse_entry(&line[start..end]) {
            records.push(rec);
        }
        start = end;
    }
    if records.is_empty() {
        return None;
    }
    Some(MatchStep {
        records,
        consumed: 1,
    })
}

fn parse_entry(line: &str) -> Option<ParsedRecord> {
    let re = Regex::new(r"^([A-Za-z0-9]+)\s+(.+?)\s*\$\s*(\d[\d.,]*)\s*$").ok()?;
    let cap = re.captures(line.trim())?;

    let code = normalize_code(&cap[1]);
    if code.is_empty() {
        return None;
    }
    // a second currency marker means this is really a multi-entry line
    if cap[2].contains('$') {
        return None;
    }

    let (name, family) = split_name_family(&cap[2])?;
    // column header rows name the columns themselves
    if name.to_lowercase().contains("nombre") || family.to_lowercase().contains("familia") {
        return None;
    }

    Some(ParsedRecord::Catalog {
        code,
        name,
        family,
        unit_price: money::normalize_str(&cap[3]),
    })
}

/// Name/family boundary: the text after the last run of two-or-more spaces
/// when the layout preserved column gaps, otherwise the final token after
/// the last single space.
fn split_name_family(middle: &str) -> Option<(String, String)> {
    let gap = Regex::new(r"\s{2,}").ok()?;
    if let Some(m) = gap.find_iter(middle).last() {
        let name = middle[..m.start()].trim();
        let family = middle[m.end()..].trim();
        if !name.is_empty() && !family.is_empty() {
            return Some((name.to_string(), family.to_string()));
        }
    }
    let (name, family) = middle.trim().rsplit_once(' ')?;
    if name.trim().is_empty() || family.trim().is_empty() {
        return None;
    }
    Some((name.trim().to_string(), family.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(rec: &ParsedRecord) -> (&str, &str, &str, i64) {
        match rec {
            ParsedRecord::Catalog {
                code,
                name,
                family,
                unit_price,
            } => (code, name, family, *unit_price),
            other => panic!("expected catalog entry, got {other:?}"),
        }
    }

    #[test]
    fn test_single_entry() {
        let rec = parse_entry("B202  Ibuprofeno 400mg  ANTIINFLAMATORIOS  $2.350,90").unwrap();
        assert_eq!(
            catalog(&rec),
            ("B202", "Ibuprofeno 400mg", "ANTIINFLAMATORIOS", 2350)
        );
    }

    #[test]
    fn test_single_space_fallback_split() {
        // no double-space run: the final token becomes the family
        let rec = parse_entry("C3 Loratadina ANTIALERGICOS $500").unwrap();
        assert_eq!(catalog(&rec), ("C3", "Loratadina", "ANTIALERGICOS", 500));
    }

    #[test]
    fn test_header_row_rejected() {
        assert!(parse_entry("X1  Nombre del producto  FAMILIA  $1").is_none());
        assert!(parse_entry("X1  Producto  Familia  $1").is_none());
    }

    #[test]
    fn test_no_price_no_match() {
        assert!(parse_entry("A001  Paracetamol 500mg  ANALGESICOS").is_none());
    }

    #[test]
    fn test_multi_entry_line_recovered() {
        let lines = vec![
            "A1 Paracetamol ANALGESICOS $1.000 B2 Ibuprofeno ANTIINFLAMATORIOS $2.000".to_string(),
        ];
        let step = match_multi(&lines, 0).unwrap();
        assert_eq!(step.consumed, 1);
        assert_eq!(step.records.len(), 2);
        assert_eq!(catalog(&step.records[0]).0, "A1");
        assert_eq!(catalog(&step.records[1]).3, 2000);
    }

    #[test]
    fn test_multi_entry_drops_bad_pieces_silently() {
        // middle piece has no code before its price and is dropped
        let lines = vec!["A1 Paracetamol ANALGESICOS $1.000 $9.999 B2 Ibuprofeno FAM $2.000"
            .to_string()];
        let step = match_multi(&lines, 0).unwrap();
        assert_eq!(step.records.len(), 2);
    }

    #[test]
    fn test_single_does_not_swallow_multi_entry_line() {
        let lines =
            vec!["A1 Paracetamol ANALGESICOS $1.000 B2 Ibuprofeno FAM $2.000".to_string()];
        assert!(match_single(&lines, 0).is_none());
    }
}
