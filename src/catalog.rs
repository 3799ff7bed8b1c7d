use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StudioError};
use crate::parameter::Parameter;
use crate::render::{Field, OutputFormat, Schema};

lazy_static! {
    static ref VERSION_REGEX: Regex = Regex::new(r"^\s*v?(\d+)\.(\d+)").unwrap();
}

/// Server path of a project's metadata endpoint
pub fn project_path(name: &str, version: &str) -> String {
    format!("/api/squirrels-v0/project/{}/{}", name, version)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Admin,
    Member,
    Guest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub elevated_access_level: Option<AccessLevel>,
    #[serde(default)]
    pub redoc_path: Option<String>,
    #[serde(default)]
    pub swagger_path: Option<String>,
    #[serde(default)]
    pub mcp_server_path: Option<String>,
    pub squirrels_version: String,
}

/// Reject projects served by a Squirrels release older than 0.5
///
/// # Errors
/// * `StudioError::UnsupportedVersion` for older or unparseable versions
pub fn validate_squirrels_version(metadata: &ProjectMetadata) -> Result<()> {
    let version = &metadata.squirrels_version;
    let caps = VERSION_REGEX
        .captures(version)
        .ok_or_else(|| StudioError::UnsupportedVersion(version.clone()))?;
    let major: u64 = caps[1].parse().map_err(|_| StudioError::UnsupportedVersion(version.clone()))?;
    let minor: u64 = caps[2].parse().map_err(|_| StudioError::UnsupportedVersion(version.clone()))?;
    if major == 0 && minor < 5 {
        return Err(StudioError::UnsupportedVersion(version.clone()));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    pub parameters_path: String,
    pub result_path: String,
    #[serde(default)]
    pub schema: Schema,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    pub parameters_path: String,
    pub result_path: String,
    pub result_format: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelColumn {
    #[serde(flatten)]
    pub field: Field,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub passthrough: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<ModelColumn>,
    #[serde(default)]
    pub load_to_vdl: Option<bool>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Seed,
    Source,
    Build,
    Dbview,
    Federate,
}

impl ModelType {
    /// Display order of the model explorer sections
    pub const ORDER: [ModelType; 5] = [
        ModelType::Seed,
        ModelType::Source,
        ModelType::Build,
        ModelType::Dbview,
        ModelType::Federate,
    ];

    /// Whether the server can show a compiled definition for this kind of model
    pub fn is_compiled(&self) -> bool {
        matches!(self, ModelType::Build | ModelType::Dbview | ModelType::Federate)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub model_type: ModelType,
    #[serde(default)]
    pub config: ModelConfig,
    #[serde(default)]
    pub is_queryable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    Dataset,
    Dashboard,
    Model,
    Lineage,
}

impl DataMode {
    /// Models and lineage are only offered to admins
    pub fn requires_admin(&self) -> bool {
        matches!(self, DataMode::Model | DataMode::Lineage)
    }
}

impl FromStr for DataMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().trim_end_matches('s') {
            "dataset" => Ok(DataMode::Dataset),
            "dashboard" => Ok(DataMode::Dashboard),
            "model" => Ok(DataMode::Model),
            "lineage" => Ok(DataMode::Lineage),
            other => Err(format!("unknown data mode '{}'", other)),
        }
    }
}

impl fmt::Display for DataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataMode::Dataset => "dataset",
            DataMode::Dashboard => "dashboard",
            DataMode::Model => "model",
            DataMode::Lineage => "lineage",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: DataMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageKind {
    Buildtime,
    Runtime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    #[serde(rename = "type")]
    pub kind: LineageKind,
    pub source: LineageNode,
    pub target: LineageNode,
}

/// A user-overridable request value the server declares
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Configurable {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCatalog {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub lineage: Vec<LineageEdge>,
    #[serde(default)]
    pub configurables: Vec<Configurable>,
}

/// A model definition rendered by the server for the current selections
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledModel {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub placeholders: serde_json::Map<String, serde_json::Value>,
}

/// Response body of every parameters endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParametersResponse {
    pub parameters: Vec<Parameter>,
}

/// Endpoints and output format for whatever the user is exploring
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataObjectContext {
    pub mode: DataMode,
    /// Data object name; `None` for model and lineage modes
    pub name: Option<String>,
    pub parameters_path: String,
    pub result_path: String,
    pub output_format: OutputFormat,
}

impl DataObjectContext {
    pub fn has_parameters(&self) -> bool {
        !self.parameters_path.is_empty()
    }

    pub fn has_results(&self) -> bool {
        !self.result_path.is_empty()
    }
}

/// Work out endpoints and output format for a data mode
///
/// # Arguments
/// * `catalog` - The project's data catalog
/// * `project_path` - Path returned by [`project_path`]
/// * `mode` - What kind of object to explore
/// * `name` - Dataset/dashboard name; the first one is used when `None`
///
/// # Returns
/// * `Option<DataObjectContext>` - `None` when the named (or any) object does not exist
pub fn resolve_context(
    catalog: &DataCatalog,
    project_path: &str,
    mode: DataMode,
    name: Option<&str>,
) -> Option<DataObjectContext> {
    match mode {
        DataMode::Dataset => {
            let ds = match name {
                Some(n) => catalog.datasets.iter().find(|d| d.name == n)?,
                None => catalog.datasets.first()?,
            };
            Some(DataObjectContext {
                mode,
                name: Some(ds.name.clone()),
                parameters_path: ds.parameters_path.clone(),
                result_path: ds.result_path.clone(),
                output_format: OutputFormat::Table,
            })
        }
        DataMode::Dashboard => {
            let db = match name {
                Some(n) => catalog.dashboards.iter().find(|d| d.name == n)?,
                None => catalog.dashboards.first()?,
            };
            Some(DataObjectContext {
                mode,
                name: Some(db.name.clone()),
                parameters_path: db.parameters_path.clone(),
                result_path: db.result_path.clone(),
                output_format: OutputFormat::from_result_format(&db.result_format),
            })
        }
        DataMode::Model => Some(DataObjectContext {
            mode,
            name: None,
            parameters_path: format!("{}/parameters", project_path),
            result_path: format!("{}/query-models", project_path),
            output_format: OutputFormat::Table,
        }),
        DataMode::Lineage => Some(DataObjectContext {
            mode,
            name: None,
            parameters_path: String::new(),
            result_path: String::new(),
            output_format: OutputFormat::Unset,
        }),
    }
}

impl DataCatalog {
    /// Models grouped by type, in explorer order; empty groups are kept
    pub fn models_by_type(&self) -> Vec<(ModelType, Vec<&Model>)> {
        ModelType::ORDER
            .iter()
            .map(|t| (*t, self.models.iter().filter(|m| m.model_type == *t).collect()))
            .collect()
    }

    pub fn connection_label(&self, name: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.label.as_str())
    }

    /// Edges feeding into `name` and edges leaving it
    pub fn lineage_for(&self, name: &str) -> (Vec<&LineageEdge>, Vec<&LineageEdge>) {
        let upstream = self.lineage.iter().filter(|e| e.target.name == name).collect();
        let downstream = self.lineage.iter().filter(|e| e.source.name == name).collect();
        (upstream, downstream)
    }
}
