//! Text rendering of command results.

use std::fmt::Write as _;

use heapscope_core::{Aggregate, DiffAggregate, SnapshotObjectId, Statistics};
use heapscope_diff::DiffTotals;
use serde::Serialize;

/// One line of a browsed class window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "row", rename_all = "snake_case")]
pub enum BrowseRow {
    Object {
        position: usize,
        label: String,
    },
    /// Positions `[from, to)` that were not retrieved.
    Placeholder {
        from: usize,
        to: usize,
    },
}

pub fn render_summary(classes: &[Aggregate], total: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:>10} {:>14} {:>14} {:>8}",
        "Class", "Count", "Self size", "Max retained", "Distance"
    );
    for class in classes {
        let _ = writeln!(
            out,
            "{:<40} {:>10} {:>14} {:>14} {:>8}",
            truncate(&class.name, 40),
            class.count,
            class.self_size,
            class.max_retained_size,
            class.distance
        );
    }
    if total > classes.len() {
        let _ = writeln!(out, "... {} more classes", total - classes.len());
    }
    out
}

pub fn render_browse(class: &str, total: usize, rows: &[BrowseRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{class} ({total} objects)");
    for row in rows {
        match row {
            BrowseRow::Object { position, label } => {
                let _ = writeln!(out, "{position:>8}  {label}");
            }
            BrowseRow::Placeholder { from, to } => {
                let _ = writeln!(out, "{:>8}  ... {} not retrieved [{from}, {to})", "", to - from);
            }
        }
    }
    out
}

pub fn render_diff(rows: &[DiffAggregate], totals: &DiffTotals) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:>8} {:>8} {:>8} {:>12} {:>12} {:>12}",
        "Class", "New", "Deleted", "Delta", "Alloc size", "Freed size", "Size delta"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<40} {:>8} {:>8} {:>+8} {:>12} {:>12} {:>+12}",
            truncate(row.name(), 40),
            row.added_count(),
            row.removed_count(),
            row.count_delta(),
            row.added_size(),
            row.removed_size(),
            row.size_delta()
        );
    }
    let _ = writeln!(
        out,
        "{:<40} {:>8} {:>8} {:>+8} {:>12} {:>12} {:>+12}",
        "Total",
        totals.added_count,
        totals.removed_count,
        totals.count_delta(),
        totals.added_size,
        totals.removed_size,
        totals.size_delta()
    );
    out
}

pub fn render_stats(stats: &Statistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Nodes: {}", stats.node_count);
    let _ = writeln!(out, "Edges: {}", stats.edge_count);
    let _ = writeln!(out, "Total size: {}", stats.total_size);
    let mut by_size: Vec<_> = stats.by_type.iter().collect();
    by_size.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (node_type, size) in by_size {
        let _ = writeln!(out, "  {node_type:<20} {size:>14} {:>6.1}%", percent(*size, stats.total_size));
    }
    out
}

pub fn render_search(query: &str, ids: &[SnapshotObjectId]) -> String {
    if ids.is_empty() {
        return format!("No objects match {query:?}\n");
    }
    let mut out = format!("{} objects match {query:?}\n", ids.len());
    for id in ids {
        let _ = writeln!(out, "  @{id}");
    }
    out
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_browse_shows_placeholders_between_objects() {
        let rows = vec![
            BrowseRow::Placeholder { from: 0, to: 200 },
            BrowseRow::Object {
                position: 200,
                label: "Point @41 self=24".to_string(),
            },
        ];
        let text = render_browse("Point", 201, &rows);
        assert!(text.starts_with("Point (201 objects)\n"));
        assert!(text.contains("... 200 not retrieved [0, 200)"));
        assert!(text.contains("     200  Point @41 self=24"));
    }

    #[test]
    fn test_summary_notes_hidden_classes() {
        let classes = vec![Aggregate {
            name: "Array".to_string(),
            count: 3,
            self_size: 96,
            max_retained_size: 200,
            distance: 2,
        }];
        let text = render_summary(&classes, 4);
        assert!(text.contains("Array"));
        assert!(text.ends_with("... 3 more classes\n"));
    }

    #[test]
    fn test_stats_orders_types_by_size() {
        let stats = Statistics {
            total_size: 100,
            node_count: 5,
            edge_count: 4,
            by_type: BTreeMap::from([("code".to_string(), 25), ("object".to_string(), 75)]),
        };
        let text = render_stats(&stats);
        let object = text.find("object").unwrap();
        let code = text.find("code").unwrap();
        assert!(object < code);
        assert!(text.contains("75.0%"));
    }

    #[test]
    fn test_long_names_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }

    #[test]
    fn test_browse_row_json_is_tagged() {
        let json = serde_json::to_string(&BrowseRow::Placeholder { from: 1, to: 3 }).unwrap();
        assert_eq!(json, r#"{"row":"placeholder","from":1,"to":3}"#);
    }
}
