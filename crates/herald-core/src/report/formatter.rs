//! Filtering and serialization of collected report data.
//!
//! Formatting is two steps. [`apply_filters`] produces a new bundle (the input is never
//! mutated) by applying the time-range and numeric filters to the time series. The filtered
//! bundle is then serialized: JSON is the authoritative form, CSV flattens the bundle into
//! header + rows, and the text and document formats wrap the JSON body with a title header.

use std::{collections::BTreeSet, fmt::Write as _};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::types::{OutputFormat, ReportFilters};
use crate::sources::{DataBundle, DataPoint};

/// Magic line at the start of every binary document payload.
pub const DOCUMENT_MAGIC: &[u8] = b"HERALD-DOCUMENT/1\n";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Title block rendered by the text and document formats.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub title: String,
    pub generated_at: DateTime<Utc>,
}

/// Serialized report ready to be stored and distributed.
#[derive(Debug, Clone)]
pub struct ReportPayload {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    /// Entries left after filtering.
    pub data_point_count: usize,
}

impl ReportPayload {
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// Applies `filters` to a copy of `bundle`.
///
/// Time bounds are inclusive. A numeric filter drops entries whose field is missing, not a
/// number, or outside `[min, max]`. The summary block is passed through unchanged.
#[must_use]
pub fn apply_filters(bundle: &DataBundle, filters: &ReportFilters) -> DataBundle {
    let time_series = bundle.time_series.as_ref().map(|series| {
        series.iter().filter(|point| matches_filters(point, filters)).cloned().collect()
    });

    DataBundle { time_series, summary: bundle.summary.clone(), synthetic: bundle.synthetic }
}

fn matches_filters(point: &DataPoint, filters: &ReportFilters) -> bool {
    if filters.start.is_some_and(|start| point.timestamp < start) {
        return false;
    }
    if filters.end.is_some_and(|end| point.timestamp > end) {
        return false;
    }

    filters.numeric.iter().all(|filter| {
        point.numeric(&filter.field).is_some_and(|value| {
            filter.min.map_or(true, |min| value >= min)
                && filter.max.map_or(true, |max| value <= max)
        })
    })
}

/// Filters and serializes a bundle into the requested format.
///
/// # Errors
///
/// Returns [`FormatError`] if the bundle cannot be serialized.
pub fn format_report(
    bundle: &DataBundle,
    filters: &ReportFilters,
    format: OutputFormat,
    header: &ReportHeader,
) -> Result<ReportPayload, FormatError> {
    let filtered = apply_filters(bundle, filters);
    let data_point_count = filtered.entry_count();

    let bytes = match format {
        OutputFormat::Json => serde_json::to_vec_pretty(&filtered)?,
        OutputFormat::Csv => to_csv(&filtered).into_bytes(),
        OutputFormat::Text => {
            let mut text = title_block(header, &filtered, data_point_count);
            text.push('\n');
            text.push_str(&serde_json::to_string_pretty(&filtered)?);
            text.push('\n');
            text.into_bytes()
        }
        OutputFormat::Document => {
            let mut bytes = DOCUMENT_MAGIC.to_vec();
            bytes.extend_from_slice(title_block(header, &filtered, data_point_count).as_bytes());
            bytes.push(0);
            bytes.extend_from_slice(&serde_json::to_vec(&filtered)?);
            bytes
        }
    };

    Ok(ReportPayload { format, bytes, data_point_count })
}

fn title_block(header: &ReportHeader, bundle: &DataBundle, data_point_count: usize) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", header.title);
    let _ = writeln!(text, "{}", "=".repeat(header.title.chars().count().max(1)));
    let _ = writeln!(text, "Generated: {}", header.generated_at.to_rfc3339());
    let _ = writeln!(text, "Data points: {data_point_count}");
    if bundle.synthetic {
        let _ = writeln!(text, "Note: source unavailable, synthetic data shown");
    }
    text
}

/// Flattens the bundle into CSV.
///
/// With a time series: one row per entry, `timestamp` first, then the union of field names in
/// sorted order. Otherwise `key,value` rows for the flattened summary.
fn to_csv(bundle: &DataBundle) -> String {
    let mut out = String::new();

    if let Some(series) = &bundle.time_series {
        let columns: BTreeSet<&str> =
            series.iter().flat_map(|point| point.fields.keys().map(String::as_str)).collect();

        let mut header = vec!["timestamp"];
        header.extend(columns.iter().copied());
        push_row(&mut out, header.iter().map(|c| (*c).to_string()));

        for point in series {
            let mut row = vec![point.timestamp.to_rfc3339()];
            row.extend(
                columns.iter().map(|c| point.fields.get(*c).map(render_cell).unwrap_or_default()),
            );
            push_row(&mut out, row.into_iter());
        }
        return out;
    }

    push_row(&mut out, ["key".to_string(), "value".to_string()].into_iter());
    if let Some(summary) = &bundle.summary {
        let mut flat = Vec::new();
        for (key, value) in summary {
            flatten_value(key, value, &mut flat);
        }
        for (key, value) in flat {
            push_row(&mut out, [key, value].into_iter());
        }
    }
    out
}

fn flatten_value(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_value(&format!("{prefix}.{key}"), nested, out);
            }
        }
        other => out.push((prefix.to_string(), render_cell(other))),
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let escaped: Vec<String> = cells.map(|cell| escape_csv(&cell)).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

fn escape_csv(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
