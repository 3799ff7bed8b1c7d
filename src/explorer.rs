//! The explorer session: one open project, one selected data object, its
//! parameter form, and the current result page.
//!
//! Every operation surfaces its own failures through the [`AppContext`] and
//! reports an [`Outcome`]; nothing is propagated to the caller.

use std::sync::Arc;

use crate::catalog::{
    CompiledModel, DataCatalog, DataMode, DataObjectContext, ParametersResponse, ProjectMetadata, project_path,
    resolve_context, validate_squirrels_version,
};
use crate::client::ApiClient;
use crate::context::{AppContext, Notice};
use crate::error::{Result, StudioError};
use crate::pager::{Direction, PageRequest, ResultPager};
use crate::refresh::{RefreshEngine, RefreshOutcome};
use crate::render::{OutputFormat, Rendered, ResultPayload, decode_payload, render};
use crate::request::{build_compiled_model_url, clamp_page_size};
use crate::store::ParameterStore;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// How an explorer operation ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Nothing to do, e.g. a disabled pagination button or a stale refresh
    Skipped,
    /// The failure has already been shown to the user
    Failed,
}

pub struct Explorer {
    client: Arc<ApiClient>,
    refresh: RefreshEngine,
    project_path: Option<String>,
    metadata: Option<ProjectMetadata>,
    catalog: DataCatalog,
    context: Option<DataObjectContext>,
    params: ParameterStore,
    pager: ResultPager,
    payload: ResultPayload,
    page_size: usize,
    sql_query: String,
    compiled: Option<CompiledModel>,
}

impl Explorer {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Explorer {
            client,
            refresh: RefreshEngine::new(),
            project_path: None,
            metadata: None,
            catalog: DataCatalog::default(),
            context: None,
            params: ParameterStore::default(),
            pager: ResultPager::new(),
            payload: ResultPayload::Absent,
            page_size: DEFAULT_PAGE_SIZE,
            sql_query: String::new(),
            compiled: None,
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    fn ctx(&self) -> &Arc<AppContext> {
        self.client.context()
    }

    pub fn project_path(&self) -> Option<&str> {
        self.project_path.as_deref()
    }

    pub fn metadata(&self) -> Option<&ProjectMetadata> {
        self.metadata.as_ref()
    }

    pub fn catalog(&self) -> &DataCatalog {
        &self.catalog
    }

    pub fn context(&self) -> Option<&DataObjectContext> {
        self.context.as_ref()
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    pub fn pager(&self) -> &ResultPager {
        &self.pager
    }

    pub fn payload(&self) -> &ResultPayload {
        &self.payload
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn sql_query(&self) -> &str {
        &self.sql_query
    }

    /// Last compiled model definition fetched with [`Explorer::compiled_model`]
    pub fn compiled(&self) -> Option<&CompiledModel> {
        self.compiled.as_ref()
    }

    pub fn output_format(&self) -> OutputFormat {
        self.context.as_ref().map(|c| c.output_format).unwrap_or_default()
    }

    /// What the result pane shows right now
    pub fn rendered(&self) -> Rendered<'_> {
        render(&self.payload, self.output_format())
    }

    fn finish(&self, result: Result<Outcome>) -> Outcome {
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.ctx().surface(&e);
                Outcome::Failed
            }
        }
    }

    /// Load metadata and catalog for a project, rejecting old Squirrels servers
    pub async fn open_project(&mut self, name: &str, version: &str) -> Outcome {
        let result = self.try_open_project(name, version).await;
        self.finish(result)
    }

    async fn try_open_project(&mut self, name: &str, version: &str) -> Result<Outcome> {
        let path = project_path(name, version);
        let metadata: ProjectMetadata = self.client.get_json(&path).await?;
        validate_squirrels_version(&metadata)?;
        let catalog: DataCatalog = self.client.get_json(&format!("{}/data-catalog", path)).await?;

        log::info!(
            "opened project {} {} ({} datasets, {} dashboards)",
            metadata.name,
            metadata.version,
            catalog.datasets.len(),
            catalog.dashboards.len()
        );
        self.project_path = Some(path);
        self.metadata = Some(metadata);
        self.catalog = catalog;
        self.clear_selection();
        Ok(Outcome::Done)
    }

    /// Fetch the catalog again, e.g. after the user logged in or out
    ///
    /// The current selection is kept when it still exists.
    pub async fn reload_catalog(&mut self) -> Outcome {
        let result = self.try_reload_catalog().await;
        self.finish(result)
    }

    async fn try_reload_catalog(&mut self) -> Result<Outcome> {
        let path = self.project_path.clone().ok_or(StudioError::NoProject)?;
        self.catalog = self.client.get_json(&format!("{}/data-catalog", path)).await?;

        let still_there = match &self.context {
            Some(ctx) => resolve_context(&self.catalog, &path, ctx.mode, ctx.name.as_deref()).is_some(),
            None => true,
        };
        if !still_there {
            self.clear_selection();
        }
        Ok(Outcome::Done)
    }

    fn clear_selection(&mut self) {
        self.context = None;
        self.compiled = None;
        self.params.replace_all(Vec::new());
        self.pager.clear();
        self.payload = ResultPayload::Absent;
    }

    /// Switch to a data object and load its parameter form
    ///
    /// Results of the previous object are discarded before anything is fetched.
    ///
    /// # Arguments
    /// * `mode` - Datasets, dashboards, models, or lineage
    /// * `name` - Object name; the first object of the mode when `None`
    pub async fn select(&mut self, mode: DataMode, name: Option<&str>) -> Outcome {
        let result = self.try_select(mode, name).await;
        self.finish(result)
    }

    async fn try_select(&mut self, mode: DataMode, name: Option<&str>) -> Result<Outcome> {
        let path = self.project_path.clone().ok_or(StudioError::NoProject)?;
        if mode.requires_admin() && !self.ctx().is_admin() {
            return Err(StudioError::Validation(format!("The {} view requires admin access", mode)));
        }
        let context = resolve_context(&self.catalog, &path, mode, name).ok_or_else(|| {
            StudioError::Validation(match name {
                Some(n) => format!("No {} named '{}'", mode, n),
                None => format!("This project has no {}s", mode),
            })
        })?;

        self.clear_selection();
        if context.has_parameters() {
            let response: ParametersResponse = self.client.get_json(&context.parameters_path).await?;
            self.params.replace_all(response.parameters);
        }
        log::debug!("selected {} {:?} with {} parameters", mode, context.name, self.params.len());
        self.context = Some(context);
        Ok(Outcome::Done)
    }

    /// Apply a widget change and cascade it to dependent widgets
    pub async fn change_selection(&mut self, name: &str, values: &[String]) -> Outcome {
        if let Err(e) = self.params.set_selection(name, values) {
            self.ctx().surface(&e);
            return Outcome::Failed;
        }
        if !self.params.triggers_refresh(name) {
            return Outcome::Done;
        }
        let selection = self
            .params
            .get(name)
            .map(|p| p.current_selection())
            .unwrap_or_default();
        self.refresh_widget_states(name, &selection).await
    }

    /// Ask the server for the new state of everything under `provoker`
    pub async fn refresh_widget_states(&mut self, provoker: &str, selection: &[String]) -> Outcome {
        let Some(parameters_path) = self
            .context
            .as_ref()
            .filter(|c| c.has_parameters())
            .map(|c| c.parameters_path.clone())
        else {
            return Outcome::Skipped;
        };

        let params = &mut self.params;
        let result = self
            .refresh
            .refresh(&self.client, &parameters_path, provoker, selection, |merge| {
                *params = merge.apply_to(params);
            })
            .await;

        match result {
            Ok(RefreshOutcome::Applied(_)) => Outcome::Done,
            Ok(RefreshOutcome::Stale) => Outcome::Skipped,
            Err(e) => {
                self.ctx().surface(&e);
                Outcome::Failed
            }
        }
    }

    /// Fetch page 1 of the current data object with the current form state
    pub async fn update_table_data(&mut self) -> Outcome {
        let Some(context) = self.context.as_ref().filter(|c| c.has_results()) else {
            return Outcome::Skipped;
        };
        let sql = match context.mode {
            DataMode::Model => {
                if self.sql_query.trim().is_empty() {
                    self.ctx().notify(Notice::new("Query", "Enter a SQL query to run against the models"));
                    return Outcome::Skipped;
                }
                Some(self.sql_query.as_str())
            }
            _ => None,
        };
        let request = self.pager.plan_apply(
            &context.result_path,
            &self.params.to_selections_map(),
            self.page_size,
            sql,
        );
        self.fetch_page(request).await
    }

    pub async fn handle_pagination(&mut self, direction: Direction) -> Outcome {
        match self.pager.plan(direction) {
            Some(request) => self.fetch_page(request).await,
            None => Outcome::Skipped,
        }
    }

    /// Store the SQL text and run it against the query-models endpoint
    pub async fn handle_run_query(&mut self, sql: &str) -> Outcome {
        self.sql_query = sql.to_string();
        match self.context.as_ref().map(|c| c.mode) {
            Some(DataMode::Model) => self.update_table_data().await,
            _ => Outcome::Skipped,
        }
    }

    /// Fetch a model's compiled definition under the current selections
    ///
    /// Only build, dbview and federate models have one; other models are
    /// skipped. The previous definition is dropped before the request goes out.
    pub async fn compiled_model(&mut self, name: &str) -> Outcome {
        self.compiled = None;
        let result = self.try_compiled_model(name).await;
        self.finish(result)
    }

    async fn try_compiled_model(&mut self, name: &str) -> Result<Outcome> {
        let path = self.project_path.clone().ok_or(StudioError::NoProject)?;
        let model_type = self
            .catalog
            .models
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.model_type)
            .ok_or_else(|| StudioError::Validation(format!("No model named '{}'", name)))?;
        if !model_type.is_compiled() {
            log::debug!("model '{}' is a {:?} model; nothing to compile", name, model_type);
            return Ok(Outcome::Skipped);
        }

        let url = build_compiled_model_url(&path, name, &self.params.to_selections_map());
        self.compiled = Some(self.client.get_json(&url).await?);
        Ok(Outcome::Done)
    }

    /// Set rows per page from user input; takes effect on the next apply
    pub fn set_page_size(&mut self, input: &str) -> usize {
        self.page_size = clamp_page_size(input);
        self.page_size
    }

    async fn fetch_page(&mut self, request: PageRequest) -> Outcome {
        let format = self.output_format();
        let url = request.url();
        let result = self
            .client
            .get_bytes(&url)
            .await
            .and_then(|body| decode_payload(format, &body));

        match result {
            Ok(payload) => {
                self.pager.commit(request, payload.total_rows());
                self.payload = payload;
                Outcome::Done
            }
            Err(e) => {
                self.ctx().surface(&e);
                Outcome::Failed
            }
        }
    }
}
