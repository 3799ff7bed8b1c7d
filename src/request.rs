//! Query-string and result-URL construction.
//!
//! Selections keep insertion order so the same form produces the same URL on
//! every request; no sorting is applied.

use std::fmt;

/// Parameter name → ordered selected values, iterated in insertion order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selections {
    entries: Vec<(String, Vec<String>)>,
}

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the values for `name`; a replaced key keeps its position
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((name, values)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for Selections {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        let mut selections = Selections::new();
        for (k, v) in iter {
            selections.insert(k, v);
        }
        selections
    }
}

/// Row- or column-major table results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Rows,
    Columns,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Rows => "rows",
            Orientation::Columns => "columns",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates `key=value` pairs, percent-encoding both sides
#[derive(Clone, Debug, Default)]
struct QueryString {
    pairs: Vec<String>,
}

impl QueryString {
    fn append(&mut self, key: &str, value: &str) {
        self.pairs.push(format!(
            "{}={}",
            urlencoding::encode(key),
            urlencoding::encode(value)
        ));
    }

    fn finish(self) -> String {
        self.pairs.join("&")
    }
}

/// Convert a selections map to a query string
///
/// One entry per (key, value) pair, values in list order. Keys with an empty
/// value list contribute nothing.
///
/// # Examples
/// ```
/// use squirrels_studio::request::{Selections, to_query_params};
///
/// let mut s = Selections::new();
/// s.insert("region", vec!["US".to_string(), "EU".to_string()]);
/// s.insert("year", vec!["2023".to_string()]);
/// assert_eq!(to_query_params(&s), "region=US&region=EU&year=2023");
/// ```
pub fn to_query_params(selections: &Selections) -> String {
    let mut query = QueryString::default();
    append_selections(&mut query, selections);
    query.finish()
}

fn append_selections(query: &mut QueryString, selections: &Selections) {
    for (name, values) in selections.iter() {
        for value in values {
            query.append(name, value);
        }
    }
}

/// Build a result request URL from a base path and the current form
///
/// Callers must not invoke this with an empty `base_url`; they short-circuit
/// when no data object (or no model query) is selected.
///
/// # Arguments
/// * `base_url` - Result path of the data object, or the query-models path
/// * `selections` - Parameter selections, in form order
/// * `offset` - Index of the first row to return
/// * `limit` - Rows per page, at least 1
/// * `orientation` - Table orientation requested from the server
/// * `sql_override` - Raw SQL for model queries, sent as `x_sql_query`
pub fn build_result_url(
    base_url: &str,
    selections: &Selections,
    offset: usize,
    limit: usize,
    orientation: Orientation,
    sql_override: Option<&str>,
) -> String {
    debug_assert!(!base_url.is_empty(), "result URL requested without a base path");
    let mut query = QueryString::default();
    append_selections(&mut query, selections);
    query.append("x_offset", &offset.to_string());
    query.append("x_limit", &limit.max(1).to_string());
    query.append("x_orientation", orientation.as_str());
    if let Some(sql) = sql_override {
        query.append("x_sql_query", sql);
    }
    format!("{}?{}", base_url, query.finish())
}

/// URL asking the server for the widgets that depend on `provoker`
pub fn build_refresh_url(parameters_path: &str, provoker: &str, selection: &[String]) -> String {
    let mut query = QueryString::default();
    query.append("x_parent_param", provoker);
    for value in selection {
        query.append(provoker, value);
    }
    format!("{}?{}", parameters_path, query.finish())
}

/// URL of a model's compiled definition under the current selections
///
/// The query string is left off entirely when there is nothing to send.
pub fn build_compiled_model_url(project_path: &str, model: &str, selections: &Selections) -> String {
    let url = format!("{}/compiled-models/{}", project_path, urlencoding::encode(model));
    match to_query_params(selections) {
        query if query.is_empty() => url,
        query => format!("{}?{}", url, query),
    }
}

/// Coerce a rows-per-page entry to a usable page size
///
/// Non-numeric input or anything below 1 becomes 1; never an error.
pub fn clamp_page_size(input: &str) -> usize {
    input.trim().parse::<i64>().map(|n| n.max(1) as usize).unwrap_or(1)
}
