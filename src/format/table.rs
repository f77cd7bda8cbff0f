//! Tabular rendering for `console.table`.

use super::format_output_value;
use crate::runtime::js_value::JsValue;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const INDEX_COLUMN: &str = "(index)";
const VALUE_COLUMN: &str = "value";

/// Render `data` as an ASCII table.
///
/// Arrays of objects get one column per key (first-seen order), other arrays
/// and plain objects get `(index) | value`. Empty collections render as
/// `[]` / `{}`; anything else renders as a single cell.
pub fn build_table_output(data: &JsValue) -> String {
    match data {
        JsValue::Array(array) => {
            if array.items.is_empty() {
                return "[]".to_string();
            }

            if array.items.iter().all(JsValue::is_object_like) {
                let mut keys: Vec<&str> = Vec::new();
                for row in &array.items {
                    for key in row.own_keys() {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                }

                let mut columns = vec![INDEX_COLUMN];
                columns.extend(keys.iter().copied());
                let rows = array
                    .items
                    .iter()
                    .enumerate()
                    .map(|(index, row)| {
                        let mut cells = vec![index.to_string()];
                        cells.extend(keys.iter().map(|key| {
                            row.property(key).map(normalize_cell).unwrap_or_default()
                        }));
                        cells
                    })
                    .collect::<Vec<_>>();
                return format_ascii_table(&columns, &rows);
            }

            let rows = array
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| vec![index.to_string(), normalize_cell(item)])
                .collect::<Vec<_>>();
            format_ascii_table(&[INDEX_COLUMN, VALUE_COLUMN], &rows)
        }
        value if value.is_object_like() => {
            let JsValue::Object(object) = value else {
                return "{}".to_string();
            };
            if object.entries.is_empty() {
                return "{}".to_string();
            }
            let rows = object
                .entries
                .iter()
                .map(|(key, value)| vec![key.clone(), normalize_cell(value)])
                .collect::<Vec<_>>();
            format_ascii_table(&[INDEX_COLUMN, VALUE_COLUMN], &rows)
        }
        other => normalize_cell(other),
    }
}

fn normalize_cell(value: &JsValue) -> String {
    let text = format_output_value(value);
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

fn format_ascii_table(columns: &[&str], rows: &[Vec<String>]) -> String {
    let widths = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            rows.iter()
                .map(|row| row.get(index).map_or(0, |cell| cell.chars().count()))
                .fold(column.chars().count(), usize::max)
        })
        .collect::<Vec<_>>();

    let header = format_row(columns.iter().copied(), &widths);
    let separator = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join("-|-");

    let mut lines = vec![header, separator];
    lines.extend(
        rows.iter()
            .map(|row| format_row(row.iter().map(String::as_str), &widths)),
    );
    lines.join("\n")
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| pad_end(cell, *width))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn pad_end(cell: &str, width: usize) -> String {
    let len = cell.chars().count();
    format!("{cell}{}", " ".repeat(width.saturating_sub(len)))
}
