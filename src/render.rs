use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

/// How the result endpoint of the current context answers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Unset,
    Table,
    Png,
    Html,
}

impl OutputFormat {
    /// Map a dashboard's declared `result_format`; anything unrecognised is `Unset`
    pub fn from_result_format(format: &str) -> Self {
        match format.to_uppercase().as_str() {
            "TABLE" => OutputFormat::Table,
            "PNG" => OutputFormat::Png,
            "HTML" => OutputFormat::Html,
            _ => OutputFormat::Unset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: FieldCategory,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Dimension,
    Metric,
    #[default]
    Misc,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    #[serde(default)]
    pub dimensions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDetails {
    pub num_rows: u64,
    #[serde(default)]
    pub orientation: String,
}

/// Tabular result body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub schema: Schema,
    pub total_num_rows: u64,
    #[serde(default)]
    pub data_details: Option<DataDetails>,
    pub data: Vec<Vec<Value>>,
}

/// A fetched result, interpreted under exactly one output format
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResultPayload {
    Table(TableData),
    /// Base64 of the raw PNG bytes
    Png(String),
    Html(String),
    #[default]
    Absent,
}

impl ResultPayload {
    pub fn format(&self) -> OutputFormat {
        match self {
            ResultPayload::Table(_) => OutputFormat::Table,
            ResultPayload::Png(_) => OutputFormat::Png,
            ResultPayload::Html(_) => OutputFormat::Html,
            ResultPayload::Absent => OutputFormat::Unset,
        }
    }

    pub fn total_rows(&self) -> Option<u64> {
        match self {
            ResultPayload::Table(t) => Some(t.total_num_rows),
            _ => None,
        }
    }
}

/// Interpret a response body under the context's output format
///
/// # Errors
/// * JSON decode failure for table results
pub fn decode_payload(format: OutputFormat, body: &[u8]) -> Result<ResultPayload> {
    Ok(match format {
        OutputFormat::Table => ResultPayload::Table(serde_json::from_slice(body)?),
        OutputFormat::Png => ResultPayload::Png(STANDARD.encode(body)),
        OutputFormat::Html => ResultPayload::Html(String::from_utf8_lossy(body).into_owned()),
        OutputFormat::Unset => ResultPayload::Absent,
    })
}

/// What the result pane should show
#[derive(Clone, Debug, PartialEq)]
pub enum Rendered<'a> {
    Nothing,
    Table(&'a TableData),
    Image { base64: &'a str },
    Html(&'a str),
}

/// Pick the presentation for a payload, refusing one that does not match the tag
pub fn render(payload: &ResultPayload, format: OutputFormat) -> Rendered<'_> {
    match (format, payload) {
        (OutputFormat::Unset, _) | (_, ResultPayload::Absent) => Rendered::Nothing,
        (OutputFormat::Table, ResultPayload::Table(t)) => Rendered::Table(t),
        (OutputFormat::Png, ResultPayload::Png(b)) => Rendered::Image { base64: b },
        (OutputFormat::Html, ResultPayload::Html(h)) => Rendered::Html(h),
        (format, payload) => {
            log::error!(
                "payload of kind {:?} cannot be shown as {:?}",
                payload.format(),
                format
            );
            Rendered::Nothing
        }
    }
}

const MAX_CELL_WIDTH: usize = 30;

/// Plain-text cell, without JSON quotes around strings
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clip(text: &str) -> String {
    if text.chars().count() > MAX_CELL_WIDTH {
        let mut clipped: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        clipped.push('…');
        clipped
    } else {
        text.to_string()
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Nothing => Ok(()),
            Rendered::Html(html) => writeln!(f, "{}", html),
            Rendered::Image { base64 } => {
                let bytes = base64.len() / 4 * 3;
                writeln!(f, "[PNG image, about {} bytes; use `export <file>` to save it]", bytes)
            }
            Rendered::Table(table) => {
                let headers: Vec<String> = table.schema.fields.iter().map(|c| clip(&c.name)).collect();
                let rows: Vec<Vec<String>> = table
                    .data
                    .iter()
                    .map(|row| row.iter().map(|v| clip(&cell_text(v))).collect())
                    .collect();

                let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
                for row in &rows {
                    for (i, cell) in row.iter().enumerate() {
                        let w = cell.chars().count();
                        match widths.get_mut(i) {
                            Some(existing) => *existing = (*existing).max(w),
                            None => widths.push(w),
                        }
                    }
                }

                for (i, h) in headers.iter().enumerate() {
                    write!(f, "{:<width$} ", h, width = widths[i])?;
                }
                writeln!(f)?;
                for w in &widths {
                    write!(f, "{} ", "-".repeat(*w))?;
                }
                writeln!(f)?;
                for row in &rows {
                    for (i, cell) in row.iter().enumerate() {
                        write!(f, "{:<width$} ", cell, width = widths[i])?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> TableData {
        serde_json::from_value(json!({
            "schema": {"fields": [{"name": "city", "type": "string"}, {"name": "sales", "type": "integer", "category": "metric"}]},
            "total_num_rows": 2,
            "data_details": {"num_rows": 2, "orientation": "rows"},
            "data": [["Paris", 10], ["Lyon", null]]
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_under_tag() {
        let body = serde_json::to_vec(&table()).unwrap();
        let payload = decode_payload(OutputFormat::Table, &body).unwrap();
        assert_eq!(payload.total_rows(), Some(2));

        let png = decode_payload(OutputFormat::Png, &[0x89, b'P', b'N', b'G']).unwrap();
        assert_eq!(png, ResultPayload::Png("iVBORw==".to_string()));
        assert_eq!(png.total_rows(), None);

        assert!(decode_payload(OutputFormat::Table, b"<html/>").is_err());
    }

    #[test]
    fn test_render_refuses_wrong_tag() {
        let payload = ResultPayload::Html("<p>hi</p>".into());
        assert_eq!(render(&payload, OutputFormat::Table), Rendered::Nothing);
        assert_eq!(render(&payload, OutputFormat::Html), Rendered::Html("<p>hi</p>"));
        assert_eq!(render(&ResultPayload::Absent, OutputFormat::Table), Rendered::Nothing);
    }

    #[test]
    fn test_table_text_layout() {
        let t = table();
        let text = render(&ResultPayload::Table(t.clone()), OutputFormat::Table).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].trim_end(), "city  sales");
        assert_eq!(lines[2].trim_end(), "Paris 10");
        assert_eq!(lines[3].trim_end(), "Lyon");
    }

    #[test]
    fn test_result_format_mapping() {
        assert_eq!(OutputFormat::from_result_format("png"), OutputFormat::Png);
        assert_eq!(OutputFormat::from_result_format("html"), OutputFormat::Html);
        assert_eq!(OutputFormat::from_result_format("svg"), OutputFormat::Unset);
    }
}
