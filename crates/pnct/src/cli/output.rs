//! Text rendering for CLI output.

use std::fmt::Write;

use serde_json::{Map, Value};

use super::OutputFormat;
use crate::dataset::Dataset;

/// Width of the longest bar drawn by [`render_bars`].
pub const BAR_WIDTH: usize = 40;

/// Render `dataset` in the requested format.
#[must_use]
pub fn render_dataset(dataset: &Dataset, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => render_plain(dataset),
        OutputFormat::Table => render_table(dataset),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&records(dataset)).unwrap_or_else(|_| "[]".to_string())
        }
    }
}

/// Semicolon-separated lines, header first.
#[must_use]
pub fn render_plain(dataset: &Dataset) -> String {
    let mut out = dataset.columns().join(";");
    out.push('\n');
    for row in dataset.rows() {
        out.push_str(&row.join(";"));
        out.push('\n');
    }
    out
}

/// Columns padded to their widest value.
#[must_use]
pub fn render_table(dataset: &Dataset) -> String {
    let mut widths: Vec<usize> = dataset.columns().iter().map(|c| width(c)).collect();
    for row in dataset.rows() {
        for (w, value) in widths.iter_mut().zip(row) {
            *w = (*w).max(width(value));
        }
    }

    let mut out = String::new();
    push_row(&mut out, dataset.columns(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in dataset.rows() {
        push_row(&mut out, row, &widths);
    }
    out
}

/// Rows as JSON objects keyed by column name.
#[must_use]
pub fn records(dataset: &Dataset) -> Value {
    let rows = dataset
        .rows()
        .iter()
        .map(|row| {
            let object: Map<String, Value> = dataset
                .columns()
                .iter()
                .zip(row)
                .map(|(column, value)| (column.clone(), Value::String(value.clone())))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

/// Horizontal bar chart, one line per label.
#[must_use]
pub fn render_bars(counts: &[(String, usize)], bar_width: usize) -> String {
    let max = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let label_width = counts.iter().map(|(l, _)| width(l)).max().unwrap_or(0);

    let mut out = String::new();
    for (label, count) in counts {
        let len = if max == 0 {
            0
        } else {
            (count * bar_width).div_ceil(max)
        };
        let pad = label_width - width(label);
        let _ = writeln!(
            out,
            "{label}{} | {} {count}",
            " ".repeat(pad),
            "#".repeat(len)
        );
    }
    out
}

fn width(text: &str) -> usize {
    text.chars().count()
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell}{}", " ".repeat(w - width(cell))))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_csv_bytes(b"br;uf;km\n101;SC;10.5\n101;RS;200\n").unwrap()
    }

    #[test]
    fn test_render_plain() {
        assert_eq!(
            render_plain(&dataset()),
            "br;uf;km\n101;SC;10.5\n101;RS;200\n"
        );
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let table = render_table(&dataset());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "br   uf  km");
        assert_eq!(lines[1], "---  --  ----");
        assert_eq!(lines[2], "101  SC  10.5");
        assert_eq!(lines[3], "101  RS  200");
    }

    #[test]
    fn test_records() {
        let json = records(&dataset());
        assert_eq!(json[0]["uf"], "SC");
        assert_eq!(json[1]["km"], "200");
    }

    #[test]
    fn test_render_dataset_json_format() {
        let out = render_dataset(&dataset(), OutputFormat::Json);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_render_bars() {
        let counts = vec![("SC".to_string(), 4), ("RS".to_string(), 2)];
        let bars = render_bars(&counts, 8);
        let lines: Vec<&str> = bars.lines().collect();
        assert_eq!(lines[0], "SC | ######## 4");
        assert_eq!(lines[1], "RS | #### 2");
    }

    #[test]
    fn test_render_bars_empty() {
        assert_eq!(render_bars(&[], BAR_WIDTH), "");
    }
}
