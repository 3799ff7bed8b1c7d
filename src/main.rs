use chrono::Utc;
use clap::Parser;
use serde_json::Map;
use squirrels_studio::auth::{self, NewUser, SESSION_POLL_INTERVAL};
use squirrels_studio::catalog::{AccessLevel, DataCatalog, DataMode};
use squirrels_studio::commands::{Command, HELP, parse_command};
use squirrels_studio::config::StudioConfig;
use squirrels_studio::context::StderrNotifier;
use squirrels_studio::downloader::{save_payload, to_tsv};
use squirrels_studio::render::ResultPayload;
use squirrels_studio::saving::{SavedSession, clear_session, load_session, save_session};
use squirrels_studio::store::ParameterStore;
use squirrels_studio::{ApiClient, AppContext, Explorer, Outcome, StudioError};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

struct Shell {
    config: StudioConfig,
    explorer: Explorer,
    watch: Option<JoinHandle<()>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = StudioConfig::parse();

    let ctx = Arc::new(AppContext::new(Arc::new(StderrNotifier)));
    let client = Arc::new(ApiClient::new(&config.host, ctx.clone())?);
    let mut explorer = Explorer::new(client);
    explorer.set_page_size(&config.page_size.to_string());

    let mut shell = Shell {
        config: config.clone(),
        explorer,
        watch: None,
    };

    if let Some(project) = &config.project {
        shell.open(project, &config.version).await;
    }

    let stdin = io::stdin();
    let mut start_time = Instant::now();
    let mut status = String::from("ok");
    loop {
        if !config.batch {
            print!("[{:.1}] ({}) > ", start_time.elapsed().as_secs_f64(), status);
            io::stdout().flush()?;
        }

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        start_time = Instant::now();

        status = match parse_command(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => shell.run(command).await,
            Err(e) => e,
        };
    }

    shell.shutdown();
    Ok(())
}

fn status_of(outcome: Outcome) -> String {
    match outcome {
        Outcome::Done => "ok",
        Outcome::Skipped => "nothing to do",
        Outcome::Failed => "failed",
    }
    .to_string()
}

impl Shell {
    fn ctx(&self) -> &Arc<AppContext> {
        self.explorer.client().context()
    }

    fn project_path(&self) -> Result<String, StudioError> {
        self.explorer
            .project_path()
            .map(str::to_string)
            .ok_or(StudioError::NoProject)
    }

    /// Report an auth/admin call the same way explorer operations report theirs
    fn report<T>(&self, result: Result<T, StudioError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.ctx().surface(&e);
                None
            }
        }
    }

    async fn open(&mut self, project: &str, version: &str) -> Outcome {
        let outcome = self.explorer.open_project(project, version).await;
        if outcome != Outcome::Done {
            return outcome;
        }
        self.restore_session();
        if let Some(path) = self.explorer.project_path() {
            if let Some(handle) = self.watch.take() {
                handle.abort();
            }
            self.watch = Some(auth::spawn_session_watch(
                self.explorer.client().clone(),
                path.to_string(),
                SESSION_POLL_INTERVAL,
            ));
        }
        if let Some(meta) = self.explorer.metadata() {
            println!("{} ({}) - {}", meta.label, meta.version, meta.description);
        }
        outcome
    }

    fn restore_session(&self) {
        let (Some(file), Some(path)) = (&self.config.session_file, self.explorer.project_path()) else {
            return;
        };
        match load_session(file, Utc::now()) {
            Ok(Some(saved)) if saved.host == self.config.host && saved.project_path == path => {
                log::info!("restored session for '{}'", saved.session.username);
                self.ctx().set_session(Some(saved.session));
            }
            Ok(_) => {}
            Err(e) => log::warn!("ignoring session file {}: {}", file.display(), e),
        }
    }

    fn persist_session(&self) {
        let Some(file) = &self.config.session_file else {
            return;
        };
        let result = match (self.ctx().session(), self.explorer.project_path()) {
            (Some(session), Some(path)) if session.access_token.is_some() => save_session(
                &SavedSession {
                    host: self.config.host.clone(),
                    project_path: path.to_string(),
                    session,
                },
                file,
            ),
            _ => clear_session(file),
        };
        if let Err(e) = result {
            log::warn!("could not update session file: {}", e);
        }
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.watch.take() {
            handle.abort();
        }
        self.persist_session();
    }

    async fn run(&mut self, command: Command) -> String {
        match command {
            Command::Help => {
                println!("{}", HELP);
                "ok".to_string()
            }
            Command::Quit => "ok".to_string(),
            Command::Open { project, version } => {
                let version = version.unwrap_or_else(|| self.config.version.clone());
                status_of(self.open(&project, &version).await)
            }
            Command::List(mode) => {
                print_catalog(self.explorer.catalog(), mode, self.ctx().is_admin());
                "ok".to_string()
            }
            Command::Select { mode, name } => {
                let outcome = self.explorer.select(mode, name.as_deref()).await;
                if outcome == Outcome::Done {
                    print_params(self.explorer.parameters());
                }
                status_of(outcome)
            }
            Command::Params => {
                print_params(self.explorer.parameters());
                "ok".to_string()
            }
            Command::Set { name, values } => {
                let outcome = self.explorer.change_selection(&name, &values).await;
                if outcome == Outcome::Done {
                    print_params(self.explorer.parameters());
                }
                status_of(outcome)
            }
            Command::Apply => {
                let outcome = self.explorer.update_table_data().await;
                self.print_result();
                status_of(outcome)
            }
            Command::Page(direction) => {
                let outcome = self.explorer.handle_pagination(direction).await;
                if outcome == Outcome::Done {
                    self.print_result();
                }
                status_of(outcome)
            }
            Command::PageSize(input) => format!("page size {}", self.explorer.set_page_size(&input)),
            Command::Sql(sql) => {
                let outcome = self.explorer.handle_run_query(&sql).await;
                if outcome == Outcome::Done {
                    self.print_result();
                }
                status_of(outcome)
            }
            Command::Show => {
                self.print_result();
                "ok".to_string()
            }
            Command::Copy => match self.explorer.payload() {
                ResultPayload::Table(table) => {
                    print!("{}", to_tsv(table));
                    "copied".to_string()
                }
                _ => "no table to copy".to_string(),
            },
            Command::Export(file) => match save_payload(self.explorer.payload(), Path::new(&file)) {
                Ok(true) => "saved".to_string(),
                Ok(false) => "no result to export".to_string(),
                Err(e) => {
                    self.ctx().surface(&e);
                    "failed".to_string()
                }
            },
            Command::Lineage(name) => {
                let (upstream, downstream) = self.explorer.catalog().lineage_for(&name);
                for edge in upstream {
                    println!("  {} ({:?}) -> {}", edge.source.name, edge.kind, name);
                }
                for edge in downstream {
                    println!("  {} -> {} ({:?})", name, edge.target.name, edge.kind);
                }
                "ok".to_string()
            }
            Command::Compiled(model) => {
                let outcome = self.explorer.compiled_model(&model).await;
                if let Some(compiled) = self.explorer.compiled() {
                    println!("-- {} ({})", model, compiled.language);
                    println!("{}", compiled.definition);
                    for (name, value) in &compiled.placeholders {
                        println!("  {} = {}", name, value);
                    }
                }
                status_of(outcome)
            }
            other => self.run_account(other).await,
        }
    }

    async fn run_account(&mut self, command: Command) -> String {
        let path = match self.project_path() {
            Ok(path) => path,
            Err(e) => return e.to_string(),
        };
        let client = self.explorer.client().clone();

        let done = match command {
            Command::Login { username, password } => {
                let session = self.report(auth::login(&client, &path, &username, &password).await);
                if let Some(session) = &session {
                    println!("Logged in as {}", session.username);
                    self.explorer.reload_catalog().await;
                    self.persist_session();
                }
                session.is_some()
            }
            Command::Logout => {
                auth::logout(&client, &path).await;
                self.explorer.reload_catalog().await;
                self.persist_session();
                true
            }
            Command::WhoAmI => match self.ctx().session() {
                Some(session) => {
                    let role = if session.is_admin { "admin" } else { "member" };
                    println!("{} ({})", session.username, role);
                    true
                }
                None => {
                    println!("guest");
                    true
                }
            },
            Command::Providers => self
                .report(auth::providers(&client, &path).await)
                .map(|providers| {
                    for p in providers {
                        println!("  {:<16} {}", p.name, client.url(&p.login_url));
                    }
                })
                .is_some(),
            Command::ApiKeys => self
                .report(auth::list_api_keys(&client, &path).await)
                .map(|keys| {
                    for key in keys {
                        let expires = key
                            .expires_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "never".to_string());
                        println!("  {:<36} {:<24} expires {}", key.id, key.title, expires);
                    }
                })
                .is_some(),
            Command::CreateApiKey { title, expiry_days } => self
                .report(auth::create_api_key(&client, &path, &title, expiry_days).await)
                .map(|secret| println!("API key (shown once): {}", secret))
                .is_some(),
            Command::DeleteApiKey(id) => self.report(auth::delete_api_key(&client, &path, &id).await).is_some(),
            Command::ChangePassword {
                current,
                new_password,
                confirm,
            } => self
                .report(auth::change_password(&client, &path, &current, &new_password, &confirm).await)
                .is_some(),
            Command::Users => {
                let fields = self.report(auth::user_fields(&client, &path).await).unwrap_or_default();
                self.report(auth::list_users(&client, &path).await)
                    .map(|users| {
                        for user in users {
                            let extra: Vec<String> = fields
                                .iter()
                                .map(|f| format!("{}={:?}", f.name, user.field(f)))
                                .collect();
                            println!("  {:<20} {:<8?} {}", user.username, user.access_level, extra.join(" "));
                        }
                    })
                    .is_some()
            }
            Command::UserFields => self
                .report(auth::user_fields(&client, &path).await)
                .map(|fields| {
                    for f in fields {
                        let nullable = if f.nullable { "nullable" } else { "required" };
                        println!("  {:<20} {:<10} {}", f.name, String::from(f.kind), nullable);
                    }
                })
                .is_some(),
            Command::AddUser {
                username,
                password,
                access_level,
                fields,
            } => {
                let result = add_user(&client, &path, username, password, access_level, &fields).await;
                self.report(result).is_some()
            }
            Command::DeleteUser(username) => self.report(auth::delete_user(&client, &path, &username).await).is_some(),
            _ => false,
        };

        if done { "ok" } else { "failed" }.to_string()
    }

    fn print_result(&self) {
        print!("{}", self.explorer.rendered());
        if let Some(status) = self.explorer.pager().status() {
            let pager = self.explorer.pager();
            let back = if pager.can_go_back() { "<" } else { " " };
            let forward = if pager.can_go_forward() { ">" } else { " " };
            println!("{} {} {}", back, status, forward);
        }
    }
}

/// Create a user, filling custom fields from `field=value` input or their defaults
async fn add_user(
    client: &ApiClient,
    path: &str,
    username: String,
    password: String,
    access_level: AccessLevel,
    input: &[(String, String)],
) -> Result<(), StudioError> {
    let declared = auth::user_fields(client, path).await?;
    let mut custom_fields = Map::new();
    for field in &declared {
        let given = input.iter().find(|(k, _)| *k == field.name).map(|(_, v)| v.as_str());
        let value = match (given, &field.default) {
            (Some(text), _) => field.parse_input(text)?,
            (None, Some(default)) => default.clone(),
            (None, None) => field.parse_input("")?,
        };
        custom_fields.insert(field.name.clone(), value);
    }
    let user = NewUser {
        username,
        password,
        access_level,
        custom_fields,
    };
    auth::create_user(client, path, &user).await
}

fn print_catalog(catalog: &DataCatalog, mode: Option<DataMode>, is_admin: bool) {
    let show = |m: DataMode| mode.is_none_or(|wanted| wanted == m) && (is_admin || !m.requires_admin());

    if show(DataMode::Dataset) {
        println!("Datasets:");
        for ds in &catalog.datasets {
            println!("  {:<24} {}", ds.name, ds.label);
        }
    }
    if show(DataMode::Dashboard) {
        println!("Dashboards:");
        for db in &catalog.dashboards {
            println!("  {:<24} {} [{}]", db.name, db.label, db.result_format);
        }
    }
    if show(DataMode::Model) {
        for (model_type, models) in catalog.models_by_type() {
            println!("{:?} models:", model_type);
            for m in models {
                let connection = m
                    .config
                    .connection
                    .as_deref()
                    .and_then(|c| catalog.connection_label(c))
                    .unwrap_or("");
                let queryable = if m.is_queryable { "" } else { " (not queryable)" };
                println!("  {:<24} {}{}", m.name, connection, queryable);
            }
        }
    }
    if show(DataMode::Lineage) {
        println!("Lineage:");
        for edge in &catalog.lineage {
            println!("  {} -> {} ({:?})", edge.source.name, edge.target.name, edge.kind);
        }
    }
}

fn print_params(store: &ParameterStore) {
    if store.is_empty() {
        println!("(no parameters)");
        return;
    }
    for p in store.iter().filter(|p| p.is_visible) {
        let lock = if p.is_enabled { "" } else { " (disabled)" };
        let label = if p.label.is_empty() { &p.name } else { &p.label };
        println!(
            "  {:<16} {:<24} {:?} = [{}]{}",
            p.name,
            label,
            p.widget.kind(),
            p.current_selection().join(", "),
            lock
        );
        let options: Vec<&str> = p.widget.options().iter().map(|o| o.id.as_str()).collect();
        if !options.is_empty() {
            println!("  {:<16} options: {}", "", options.join(", "));
        }
    }
}
