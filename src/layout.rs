// src/layout.rs

use serde::Deserialize;
use std::collections::BTreeMap;

/// One atomic text run at a page coordinate, as handed over by the
/// text-layer extraction collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionedFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

/// A reconstructed visual line: fragment texts joined left-to-right,
/// tagged with the quantized y bucket it was grouped under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub bucket: i64,
    pub text: String,
}

/// Baseline jitter tolerance in PDF coordinate units. Proportional fonts
/// emit fragments of one visual line a fraction of a unit apart.
pub const Y_TOLERANCE: f64 = 5.0;

/// Group one page's fragments into ordered logical lines.
///
/// Fragments are bucketed by `round(y / tolerance)`. Buckets are emitted in
/// descending y order (PDF origin is bottom-left, so that is top-to-bottom
/// reading order); within a bucket fragments run left-to-right. The output
/// depends only on the fragment set, never on its iteration order.
pub fn reconstruct_page(fragments: &[PositionedFragment], tolerance: f64) -> Vec<LogicalLine> {
    let mut buckets: BTreeMap<i64, Vec<&PositionedFragment>> = BTreeMap::new();
    for frag in fragments {
        let bucket = (frag.y / tolerance).round() as i64;
        buckets.entry(bucket).or_default().push(frag);
    }

    let mut lines = Vec::with_capacity(buckets.len());
    for (bucket, mut frags) in buckets.into_iter().rev() {
        // tie-break equal x on text so permuted input sorts identically
        frags.sort_by(|a, b| a.x.total_cmp(&b.x).then_with(|| a.text.cmp(&b.text)));
        let text = frags
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            lines.push(LogicalLine { bucket, text });
        }
    }
    lines
}

/// Reconstruct a whole document: per-page line sequences concatenated in
/// page order. Lines are never merged across pages.
pub fn reconstruct_document(
    pages: &[Vec<PositionedFragment>],
    tolerance: f64,
) -> Vec<LogicalLine> {
    pages
        .iter()
        .flat_map(|page| reconstruct_page(page, tolerance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, x: f64, y: f64) -> PositionedFragment {
        PositionedFragment {
            text: text.to_string(),
            x,
            y,
        }
    }

    #[test]
    fn test_orders_top_to_bottom_left_to_right() {
        let frags = vec![
            frag("500mg", 40.0, 700.0),
            frag("Paracetamol", 10.0, 700.0),
            frag("12", 60.0, 650.0),
            frag("AB1234", 10.0, 750.0),
        ];
        let lines = reconstruct_page(&frags, Y_TOLERANCE);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["AB1234", "Paracetamol 500mg", "12"]);
    }

    #[test]
    fn test_permutation_invariance() {
        let frags = vec![
            frag("a", 10.0, 100.0),
            frag("b", 20.0, 101.2),
            frag("c", 15.0, 200.0),
            frag("d", 5.0, 99.1),
        ];
        let baseline = reconstruct_page(&frags, Y_TOLERANCE);

        let mut reversed = frags.clone();
        reversed.reverse();
        assert_eq!(reconstruct_page(&reversed, Y_TOLERANCE), baseline);

        let rotated: Vec<_> = frags[2..].iter().chain(&frags[..2]).cloned().collect();
        assert_eq!(reconstruct_page(&rotated, Y_TOLERANCE), baseline);
    }

    #[test]
    fn test_jitter_within_tolerance_groups() {
        let frags = vec![frag("left", 0.0, 100.0), frag("right", 50.0, 101.9)];
        let lines = reconstruct_page(&frags, Y_TOLERANCE);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "left right");
    }

    #[test]
    fn test_distant_baselines_stay_separate() {
        let frags = vec![frag("upper", 0.0, 110.0), frag("lower", 0.0, 100.0)];
        let lines = reconstruct_page(&frags, Y_TOLERANCE);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "upper");
        assert_eq!(lines[1].text, "lower");
    }

    #[test]
    fn test_blank_fragments_discarded() {
        let frags = vec![frag("  ", 0.0, 100.0), frag("", 10.0, 50.0)];
        assert!(reconstruct_page(&frags, Y_TOLERANCE).is_empty());
    }

    #[test]
    fn test_pages_concatenate_without_merging() {
        let pages = vec![
            vec![frag("page one", 0.0, 100.0)],
            vec![frag("page two", 0.0, 700.0)],
        ];
        let lines = reconstruct_document(&pages, Y_TOLERANCE);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["page one", "page two"]);
    }
}
