use serde_json::json;
use std::fs;

use squirrels_studio::downloader::{save_payload, to_csv, to_tsv};
use squirrels_studio::render::{OutputFormat, ResultPayload, TableData, decode_payload, render};

fn table() -> TableData {
    serde_json::from_value(json!({
        "schema": {"fields": [
            {"name": "city", "type": "string", "category": "dimension"},
            {"name": "note", "type": "string"},
            {"name": "sales", "type": "number", "category": "metric"}
        ]},
        "total_num_rows": 2,
        "data": [
            ["Paris, FR", "said \"hi\"", 12.5],
            ["Oslo", "two\nlines", null]
        ]
    }))
    .unwrap()
}

#[test]
fn test_csv_escaping() {
    let csv = to_csv(&table());
    let expected = "city,note,sales\n\"Paris, FR\",\"said \"\"hi\"\"\",12.5\nOslo,\"two\nlines\",\n";
    assert_eq!(csv, expected);
}

#[test]
fn test_csv_quotes_carriage_returns() {
    let table: TableData = serde_json::from_value(json!({
        "schema": {"fields": [{"name": "note", "type": "string"}, {"name": "n", "type": "integer"}]},
        "total_num_rows": 2,
        "data": [["dos\r\nline", 1], ["bare\rcr", 2]]
    }))
    .unwrap();
    assert_eq!(to_csv(&table), "note,n\n\"dos\r\nline\",1\n\"bare\rcr\",2\n");
}

#[test]
fn test_tsv_keeps_rows_on_one_line() {
    let tsv = to_tsv(&table());
    let lines: Vec<&str> = tsv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "city\tnote\tsales");
    assert_eq!(lines[1], "Paris, FR\tsaid \"hi\"\t12.5");
    assert_eq!(lines[2], "Oslo\ttwo lines\t");
}

#[test]
fn test_save_each_payload_kind() {
    let dir = tempfile::tempdir().unwrap();

    let png_bytes = b"\x89PNG\r\n\x1a\nrest";
    let png = decode_payload(OutputFormat::Png, png_bytes).unwrap();
    let png_path = dir.path().join("chart.png");
    assert!(save_payload(&png, &png_path).unwrap());
    assert_eq!(fs::read(&png_path).unwrap(), png_bytes);

    let html = decode_payload(OutputFormat::Html, b"<b>hi</b>").unwrap();
    let html_path = dir.path().join("page.html");
    assert!(save_payload(&html, &html_path).unwrap());
    assert_eq!(fs::read_to_string(&html_path).unwrap(), "<b>hi</b>");

    let csv_path = dir.path().join("table.csv");
    assert!(save_payload(&ResultPayload::Table(table()), &csv_path).unwrap());
    assert!(fs::read_to_string(&csv_path).unwrap().starts_with("city,note,sales\n"));

    assert!(!save_payload(&ResultPayload::Absent, &dir.path().join("none")).unwrap());
}

#[test]
fn test_rendered_table_is_aligned() {
    let payload = ResultPayload::Table(table());
    let text = render(&payload, OutputFormat::Table).to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("city      "));
    assert!(lines[1].starts_with("---------"));
    assert_eq!(render(&payload, OutputFormat::Png).to_string(), "");
}
