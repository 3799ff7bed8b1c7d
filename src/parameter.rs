use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::{Result, StudioError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One user-configurable filter as described by the parameters endpoint
///
/// The widget-specific fields live in [`Widget`]; everything else is common to
/// all widget kinds. `name` is the stable identity used by merges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub description: String,

    /// Names of the parameters this one depends on (empty for roots)
    #[serde(default)]
    pub parent_names: BTreeSet<String>,

    /// Server hint that changing this widget refreshes its children
    #[serde(default)]
    pub trigger_refresh: bool,

    #[serde(default = "default_true")]
    pub is_enabled: bool,

    #[serde(default = "default_true")]
    pub is_visible: bool,

    #[serde(flatten)]
    pub widget: Widget,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleSelect {
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub selected_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiSelect {
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub selected_ids: Vec<String>,
    #[serde(default)]
    pub show_select_all: bool,
    #[serde(default)]
    pub order_matters: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DateWidget {
    pub selected_date: String,
    #[serde(default)]
    pub min_date: Option<String>,
    #[serde(default)]
    pub max_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DateRangeWidget {
    pub selected_start_date: String,
    pub selected_end_date: String,
    #[serde(default)]
    pub min_date: Option<String>,
    #[serde(default)]
    pub max_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumberWidget {
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default)]
    pub increment: Option<f64>,
    pub selected_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumberRangeWidget {
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default)]
    pub increment: Option<f64>,
    pub selected_lower_value: f64,
    pub selected_upper_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextWidget {
    #[serde(default)]
    pub entered_text: String,
    #[serde(default)]
    pub input_type: Option<String>,
}

/// Widget configuration, one variant per widget kind the server declares
///
/// Kinds this client does not know are kept as [`Widget::Unknown`] with their
/// raw fields so they survive a merge and can be shown read-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub enum Widget {
    SingleSelect(SingleSelect),
    MultiSelect(MultiSelect),
    Date(DateWidget),
    DateRange(DateRangeWidget),
    Number(NumberWidget),
    NumberRange(NumberRangeWidget),
    Text(TextWidget),
    Unknown {
        widget_type: String,
        fields: Map<String, Value>,
    },
}

// Wire shape of the known kinds, tagged by `widget_type`
#[derive(Serialize, Deserialize)]
#[serde(tag = "widget_type", rename_all = "snake_case")]
enum WidgetRepr {
    SingleSelect(SingleSelect),
    MultiSelect(MultiSelect),
    Date(DateWidget),
    DateRange(DateRangeWidget),
    Number(NumberWidget),
    NumberRange(NumberRangeWidget),
    Text(TextWidget),
}

impl From<Map<String, Value>> for Widget {
    fn from(fields: Map<String, Value>) -> Self {
        match serde_json::from_value::<WidgetRepr>(Value::Object(fields.clone())) {
            Ok(WidgetRepr::SingleSelect(w)) => Widget::SingleSelect(w),
            Ok(WidgetRepr::MultiSelect(w)) => Widget::MultiSelect(w),
            Ok(WidgetRepr::Date(w)) => Widget::Date(w),
            Ok(WidgetRepr::DateRange(w)) => Widget::DateRange(w),
            Ok(WidgetRepr::Number(w)) => Widget::Number(w),
            Ok(WidgetRepr::NumberRange(w)) => Widget::NumberRange(w),
            Ok(WidgetRepr::Text(w)) => Widget::Text(w),
            Err(e) => {
                let widget_type = fields
                    .get("widget_type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                log::debug!("keeping widget '{}' as raw fields: {}", widget_type, e);
                let mut fields = fields;
                fields.remove("widget_type");
                Widget::Unknown {
                    widget_type,
                    fields,
                }
            }
        }
    }
}

impl From<Widget> for Map<String, Value> {
    fn from(widget: Widget) -> Self {
        let repr = match widget {
            Widget::SingleSelect(w) => WidgetRepr::SingleSelect(w),
            Widget::MultiSelect(w) => WidgetRepr::MultiSelect(w),
            Widget::Date(w) => WidgetRepr::Date(w),
            Widget::DateRange(w) => WidgetRepr::DateRange(w),
            Widget::Number(w) => WidgetRepr::Number(w),
            Widget::NumberRange(w) => WidgetRepr::NumberRange(w),
            Widget::Text(w) => WidgetRepr::Text(w),
            Widget::Unknown {
                widget_type,
                mut fields,
            } => {
                fields.insert("widget_type".to_string(), Value::String(widget_type));
                return fields;
            }
        };
        match serde_json::to_value(repr) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetKind {
    SingleSelect,
    MultiSelect,
    Date,
    DateRange,
    Number,
    NumberRange,
    Text,
    Unknown,
}

impl Widget {
    pub fn kind(&self) -> WidgetKind {
        match self {
            Widget::SingleSelect(_) => WidgetKind::SingleSelect,
            Widget::MultiSelect(_) => WidgetKind::MultiSelect,
            Widget::Date(_) => WidgetKind::Date,
            Widget::DateRange(_) => WidgetKind::DateRange,
            Widget::Number(_) => WidgetKind::Number,
            Widget::NumberRange(_) => WidgetKind::NumberRange,
            Widget::Text(_) => WidgetKind::Text,
            Widget::Unknown { .. } => WidgetKind::Unknown,
        }
    }

    pub fn options(&self) -> &[SelectOption] {
        match self {
            Widget::SingleSelect(w) => &w.options,
            Widget::MultiSelect(w) => &w.options,
            _ => &[],
        }
    }
}

impl Parameter {
    /// Ordered selection values as they go on the wire
    ///
    /// # Returns
    /// * `Vec<String>` - One entry per selected value; empty when nothing is selected
    pub fn current_selection(&self) -> Vec<String> {
        match &self.widget {
            Widget::SingleSelect(w) => w.selected_id.iter().cloned().collect(),
            Widget::MultiSelect(w) => w.selected_ids.clone(),
            Widget::Date(w) => vec![w.selected_date.clone()],
            Widget::DateRange(w) => {
                vec![w.selected_start_date.clone(), w.selected_end_date.clone()]
            }
            Widget::Number(w) => vec![w.selected_value.to_string()],
            Widget::NumberRange(w) => vec![
                w.selected_lower_value.to_string(),
                w.selected_upper_value.to_string(),
            ],
            Widget::Text(w) => vec![w.entered_text.clone()],
            Widget::Unknown { .. } => Vec::new(),
        }
    }

    /// Replace the selection after checking it against the widget kind
    ///
    /// # Arguments
    /// * `values` - New selection, in the order the user picked them
    ///
    /// # Errors
    /// * `StudioError::InvalidSelection` if the widget is disabled, the arity is
    ///   wrong, an option id is unknown, or a date/number fails to parse or is out of bounds
    pub fn set_selection(&mut self, values: &[String]) -> Result<()> {
        if !self.is_enabled {
            return Err(StudioError::invalid_selection(&self.name, "widget is disabled"));
        }
        let name = self.name.clone();

        match &mut self.widget {
            Widget::SingleSelect(w) => match values {
                [] => w.selected_id = None,
                [id] => {
                    check_option(&name, &w.options, id)?;
                    w.selected_id = Some(id.clone());
                }
                _ => return Err(StudioError::invalid_selection(&name, "expects one option")),
            },
            Widget::MultiSelect(w) => {
                for id in values {
                    check_option(&name, &w.options, id)?;
                }
                w.selected_ids = values.to_vec();
            }
            Widget::Date(w) => {
                let [value] = values else {
                    return Err(StudioError::invalid_selection(&name, "expects one date"));
                };
                let date = parse_date(&name, value)?;
                check_date_bounds(&name, date, &w.min_date, &w.max_date)?;
                w.selected_date = value.clone();
            }
            Widget::DateRange(w) => {
                let [start, end] = values else {
                    return Err(StudioError::invalid_selection(&name, "expects a start and end date"));
                };
                let (start_date, end_date) = (parse_date(&name, start)?, parse_date(&name, end)?);
                if start_date > end_date {
                    return Err(StudioError::invalid_selection(&name, "start date is after end date"));
                }
                check_date_bounds(&name, start_date, &w.min_date, &w.max_date)?;
                check_date_bounds(&name, end_date, &w.min_date, &w.max_date)?;
                w.selected_start_date = start.clone();
                w.selected_end_date = end.clone();
            }
            Widget::Number(w) => {
                let [value] = values else {
                    return Err(StudioError::invalid_selection(&name, "expects one number"));
                };
                let number = parse_number(&name, value, w.min_value, w.max_value)?;
                w.selected_value = number;
            }
            Widget::NumberRange(w) => {
                let [lower, upper] = values else {
                    return Err(StudioError::invalid_selection(&name, "expects a lower and upper number"));
                };
                let lower = parse_number(&name, lower, w.min_value, w.max_value)?;
                let upper = parse_number(&name, upper, w.min_value, w.max_value)?;
                if lower > upper {
                    return Err(StudioError::invalid_selection(&name, "lower value exceeds upper value"));
                }
                w.selected_lower_value = lower;
                w.selected_upper_value = upper;
            }
            Widget::Text(w) => match values {
                [] => w.entered_text.clear(),
                [text] => w.entered_text = text.clone(),
                _ => return Err(StudioError::invalid_selection(&name, "expects one text value")),
            },
            Widget::Unknown { widget_type, .. } => {
                return Err(StudioError::invalid_selection(
                    &name,
                    format!("unsupported widget type '{}'", widget_type),
                ));
            }
        }
        Ok(())
    }

    /// Drop a self-reference from `parent_names`; the server should never send one
    pub(crate) fn normalize(mut self) -> Self {
        if self.parent_names.remove(&self.name) {
            log::warn!("parameter '{}' listed itself as a parent", self.name);
        }
        self
    }
}

fn check_option(name: &str, options: &[SelectOption], id: &str) -> Result<()> {
    if options.iter().any(|o| o.id == id) {
        Ok(())
    } else {
        Err(StudioError::invalid_selection(name, format!("unknown option '{}'", id)))
    }
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| StudioError::invalid_selection(name, format!("'{}' is not a YYYY-MM-DD date", value)))
}

fn check_date_bounds(
    name: &str,
    date: NaiveDate,
    min: &Option<String>,
    max: &Option<String>,
) -> Result<()> {
    if let Some(min) = min.as_deref().and_then(|m| NaiveDate::parse_from_str(m, DATE_FORMAT).ok()) {
        if date < min {
            return Err(StudioError::invalid_selection(name, format!("date is before {}", min)));
        }
    }
    if let Some(max) = max.as_deref().and_then(|m| NaiveDate::parse_from_str(m, DATE_FORMAT).ok()) {
        if date > max {
            return Err(StudioError::invalid_selection(name, format!("date is after {}", max)));
        }
    }
    Ok(())
}

fn parse_number(name: &str, value: &str, min: f64, max: f64) -> Result<f64> {
    let number: f64 = value
        .trim()
        .parse()
        .map_err(|_| StudioError::invalid_selection(name, format!("'{}' is not a number", value)))?;
    if number < min || number > max {
        return Err(StudioError::invalid_selection(
            name,
            format!("{} is outside [{}, {}]", number, min, max),
        ));
    }
    Ok(number)
}
