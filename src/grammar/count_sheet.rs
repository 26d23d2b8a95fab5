// src/grammar/count_sheet.rs

use super::{MatchStep, ParsedRecord, normalize_code};
use crate::money;
use regex::Regex;

/// Count sheets spread each product over two physical lines: a code line,
/// then a name line ending in the counted quantity.
///
///   `AB1234*`
///   `Amoxicilina 500  12`
///
/// A code line whose follower fails the name/quantity pattern yields no
/// record — many code-shaped lines are section headers or continuations —
/// and only the code line is consumed.
pub(super) fn match_pair(lines: &[String], i: usize) -> Option<MatchStep> {
    let code = match_code(lines.get(i)?)?;

    let Some(next) = lines.get(i + 1) else {
        return Some(MatchStep {
            records: vec![],
            consumed: 1,
        });
    };
    match match_name_quantity(next) {
        Some((name, quantity)) => Some(MatchStep {
            records: vec![ParsedRecord::Count {
                code,
                name,
                quantity,
            }],
            consumed: 2,
        }),
        None => Some(MatchStep {
            records: vec![],
            consumed: 1,
        }),
    }
}

/// Two-or-more uppercase letters followed by digits, optionally suffixed
/// with a marker glyph, or a bare digit run.
fn match_code(line: &str) -> Option<String> {
    let re = Regex::new(r"^([A-Z]{2,}\d+[*°]?|\d+)$").ok()?;
    let cap = re.captures(line.trim())?;
    let code = normalize_code(&cap[1]);
    if code.is_empty() { None } else { Some(code) }
}

/// Product name followed by a trailing integer quantity.
fn match_name_quantity(line: &str) -> Option<(String, i64)> {
    let re = Regex::new(r"^(.+?)\s+(\d+)$").ok()?;
    let cap = re.captures(line.trim())?;
    let name = cap[1].trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some((name, money::normalize_str(&cap[2])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_code_patterns() {
        assert_eq!(match_code("AB1234"), Some("AB1234".to_string()));
        assert_eq!(match_code("AB1234*"), Some("AB1234".to_string()));
        assert_eq!(match_code("773311"), Some("773311".to_string()));
        assert_eq!(match_code("A1"), None); // single letter
        assert_eq!(match_code("AB1234 extra"), None);
    }

    #[test]
    fn test_pair_yields_count() {
        let input = lines(&["FR5501*", "Fluoxetina 20mg  48"]);
        let step = match_pair(&input, 0).unwrap();
        assert_eq!(step.consumed, 2);
        assert_eq!(
            step.records,
            vec![ParsedRecord::Count {
                code: "FR5501".to_string(),
                name: "Fluoxetina 20mg".to_string(),
                quantity: 48,
            }]
        );
    }

    #[test]
    fn test_follower_without_quantity_consumes_code_only() {
        let input = lines(&["FR5501", "Seccion refrigerados"]);
        let step = match_pair(&input, 0).unwrap();
        assert!(step.records.is_empty());
        assert_eq!(step.consumed, 1);
    }

    #[test]
    fn test_code_at_end_of_document() {
        let input = lines(&["FR5501"]);
        let step = match_pair(&input, 0).unwrap();
        assert!(step.records.is_empty());
        assert_eq!(step.consumed, 1);
    }

    #[test]
    fn test_non_code_line_does_not_match() {
        let input = lines(&["Amoxicilina 500  12"]);
        assert!(match_pair(&input, 0).is_none());
    }
}
