use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;

use crate::error::Result;
use crate::render::{ResultPayload, TableData, cell_text};

/// Convert table data to tab-separated text for the clipboard
///
/// The first line holds the field names; tabs and newlines inside values are
/// replaced with spaces so each row stays on one line.
///
/// # Arguments
/// * `table` - The current result page
///
/// # Returns
/// * `String` - TSV text, newline-terminated rows
pub fn to_tsv(table: &TableData) -> String {
    let clean = |s: String| s.replace(['\t', '\n', '\r'], " ");
    let mut out = String::new();

    let header: Vec<String> = table.schema.fields.iter().map(|f| clean(f.name.clone())).collect();
    out.push_str(&header.join("\t"));
    out.push('\n');

    for row in &table.data {
        let cells: Vec<String> = row.iter().map(|v| clean(cell_text(v))).collect();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out
}

/// Convert table data to CSV
///
/// Values with commas, quotes, or newlines are quoted and inner quotes doubled.
///
/// # Examples
/// ```
/// use squirrels_studio::downloader::to_csv;
/// use squirrels_studio::render::TableData;
///
/// let table: TableData = serde_json::from_value(serde_json::json!({
///     "schema": {"fields": [{"name": "city", "type": "string"}]},
///     "total_num_rows": 1,
///     "data": [["Paris, FR"]]
/// })).unwrap();
/// assert_eq!(to_csv(&table), "city\n\"Paris, FR\"\n");
/// ```
pub fn to_csv(table: &TableData) -> String {
    let mut csv_content = String::new();

    for (i, field) in table.schema.fields.iter().enumerate() {
        if i > 0 {
            csv_content.push(',');
        }
        push_csv_value(&mut csv_content, &field.name);
    }
    csv_content.push('\n');

    for row in &table.data {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                csv_content.push(',');
            }
            push_csv_value(&mut csv_content, &cell_text(value));
        }
        csv_content.push('\n');
    }
    csv_content
}

fn push_csv_value(out: &mut String, value: &str) {
    if value.contains([',', '"', '\n', '\r']) {
        let escaped = value.replace('"', "\"\"");
        out.push_str(&format!("\"{}\"", escaped));
    } else {
        out.push_str(value);
    }
}

/// Save a result payload to disk in its natural format
///
/// PNG payloads are base64-decoded and written raw, HTML is written as text,
/// tables as CSV. An absent payload writes nothing and returns `false`.
pub fn save_payload(payload: &ResultPayload, path: &Path) -> Result<bool> {
    match payload {
        ResultPayload::Table(table) => std::fs::write(path, to_csv(table))?,
        ResultPayload::Png(b64) => std::fs::write(path, STANDARD.decode(b64.trim())?)?,
        ResultPayload::Html(html) => std::fs::write(path, html)?,
        ResultPayload::Absent => return Ok(false),
    }
    log::info!("wrote {}", path.display());
    Ok(true)
}
