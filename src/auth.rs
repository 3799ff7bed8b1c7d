//! Login, session upkeep, and the account/admin endpoints.

use chrono::{DateTime, Utc};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::catalog::AccessLevel;
use crate::client::ApiClient;
use crate::context::Session;
use crate::error::{Result, StudioError};

/// How often the session watch asks the server whether we are still logged in
pub const SESSION_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Base path of the auth routes for a project
pub fn auth_path(project_path: &str) -> String {
    format!("{}/auth", project_path)
}

/// Optional token body some servers return from the login endpoint
#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    username: Option<String>,
    access_token: Option<String>,
    expiry_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub access_level: AccessLevel,
    #[serde(flatten)]
    pub custom_fields: Map<String, Value>,
}

/// An external identity provider offered on the login screen
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    pub login_url: String,
}

/// Log in with username and password
///
/// Posts the credentials as a multipart form to `{project}/login`. Any token in
/// the response is kept for bearer auth; the session cookie is kept by the
/// client's cookie store either way. The user's access level comes from
/// `userinfo` when the server has it.
///
/// # Arguments
/// * `client` - Transport for the project's host
/// * `project_path` - Project metadata path
/// * `username` - Login name
/// * `password` - Plain text password, sent only in the form body
///
/// # Returns
/// * `Result<Session>` - The installed session
///
/// # Errors
/// * `StudioError::InvalidCredentials` on 401
/// * Any other transport or server error
pub async fn login(client: &ApiClient, project_path: &str, username: &str, password: &str) -> Result<Session> {
    let ctx = client.context();
    ctx.set_session(None);

    let form = multipart::Form::new()
        .text("username", username.to_string())
        .text("password", password.to_string());
    let body = match client.post_form(&format!("{}/login", project_path), form).await {
        Ok(body) => body,
        Err(StudioError::AuthRequired) => return Err(StudioError::InvalidCredentials),
        Err(e) => return Err(e),
    };
    let token: LoginResponse = serde_json::from_slice(&body).unwrap_or_default();

    let mut session = Session {
        username: token.username.unwrap_or_else(|| username.to_string()),
        access_token: token.access_token,
        expiry: token.expiry_time,
        is_admin: false,
    };
    ctx.set_session(Some(session.clone()));

    match user_info(client, project_path).await {
        Ok(info) => {
            session.username = info.username;
            session.is_admin = info.access_level == AccessLevel::Admin;
            ctx.set_session(Some(session.clone()));
        }
        Err(e @ StudioError::SessionInvalidated { .. }) => {
            ctx.set_session(None);
            return Err(e);
        }
        Err(e) => log::warn!("could not read user info after login: {}", e),
    }

    log::info!("logged in as '{}'", session.username);
    Ok(session)
}

/// Tell the server to end the session, then forget it locally
///
/// The server call is best effort; the local session is cleared regardless.
pub async fn logout(client: &ApiClient, project_path: &str) {
    if let Err(e) = client.get_bytes(&format!("{}/logout", auth_path(project_path))).await {
        log::debug!("logout request failed: {}", e);
    }
    client.context().set_session(None);
}

pub async fn user_info(client: &ApiClient, project_path: &str) -> Result<UserInfo> {
    client.get_json(&format!("{}/userinfo", auth_path(project_path))).await
}

pub async fn providers(client: &ApiClient, project_path: &str) -> Result<Vec<Provider>> {
    client.get_json(&format!("{}/providers", project_path)).await
}

/// Watch for session expiry in the background
///
/// Every `period` the task checks the token expiry and asks `userinfo` whether
/// the server still knows us; either failure forces a logout with a
/// "Session Expired" notice. Abort the handle to stop watching.
pub fn spawn_session_watch(client: Arc<ApiClient>, project_path: String, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let ctx = client.context();
            let Some(session) = ctx.session() else {
                continue;
            };
            if session.is_expired(Utc::now()) {
                ctx.force_logout("Session Expired", "User session expired");
                continue;
            }
            match user_info(&client, &project_path).await {
                Ok(_) => {}
                Err(StudioError::AuthRequired | StudioError::SessionInvalidated { .. }) => {
                    ctx.force_logout("Session Expired", "User session expired");
                }
                Err(e) => log::error!("Error checking authentication status: {}", e),
            }
        }
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct NewApiKeyRequest<'a> {
    title: &'a str,
    expiry_minutes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NewApiKeyResponse {
    api_key: String,
}

pub async fn list_api_keys(client: &ApiClient, project_path: &str) -> Result<Vec<ApiKey>> {
    client.get_json(&format!("{}/api-key", auth_path(project_path))).await
}

/// Create an API key and return its secret, which the server shows only once
///
/// # Arguments
/// * `title` - Description shown in the key list; must not be blank
/// * `expiry_days` - Lifetime in days, or `None` for a key that never expires
pub async fn create_api_key(
    client: &ApiClient,
    project_path: &str,
    title: &str,
    expiry_days: Option<u64>,
) -> Result<String> {
    if title.trim().is_empty() {
        return Err(StudioError::Validation("API Key description is required".to_string()));
    }
    let request = NewApiKeyRequest {
        title,
        expiry_minutes: expiry_days.map(|d| d * 24 * 60),
    };
    let response: NewApiKeyResponse = client
        .post_json(&format!("{}/api-key", auth_path(project_path)), &request)
        .await?;
    Ok(response.api_key)
}

pub async fn delete_api_key(client: &ApiClient, project_path: &str, id: &str) -> Result<()> {
    client
        .delete(&format!("{}/api-key/{}", auth_path(project_path), urlencoding::encode(id)))
        .await
}

#[derive(Debug, Serialize)]
struct PasswordChange<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

/// Change the logged-in user's password
///
/// # Errors
/// * `StudioError::Validation` when the confirmation does not match
pub async fn change_password(
    client: &ApiClient,
    project_path: &str,
    current: &str,
    new_password: &str,
    confirm: &str,
) -> Result<()> {
    if new_password != confirm {
        return Err(StudioError::Validation("New passwords do not match".to_string()));
    }
    let body = PasswordChange {
        old_password: current,
        new_password,
    };
    client.put_json(&format!("{}/password", auth_path(project_path)), &body).await
}

/// Declared type of a custom user field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserFieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Other(String),
}

impl From<String> for UserFieldKind {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "string" | "str" | "text" => UserFieldKind::Text,
            "integer" | "int" => UserFieldKind::Integer,
            "float" | "number" | "decimal" => UserFieldKind::Float,
            "boolean" | "bool" => UserFieldKind::Boolean,
            _ => UserFieldKind::Other(s),
        }
    }
}

impl From<UserFieldKind> for String {
    fn from(kind: UserFieldKind) -> Self {
        match kind {
            UserFieldKind::Text => "string".to_string(),
            UserFieldKind::Integer => "integer".to_string(),
            UserFieldKind::Float => "float".to_string(),
            UserFieldKind::Boolean => "boolean".to_string(),
            UserFieldKind::Other(s) => s,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: UserFieldKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Fields every user has; the user-management form handles these itself
pub const BUILTIN_USER_FIELDS: [&str; 3] = ["username", "password", "access_level"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserFieldsResponse {
    Bare(Vec<UserField>),
    Wrapped { fields: Vec<UserField> },
}

impl UserFieldsResponse {
    fn custom_fields(self) -> Vec<UserField> {
        let fields = match self {
            UserFieldsResponse::Bare(fields) => fields,
            UserFieldsResponse::Wrapped { fields } => fields,
        };
        fields
            .into_iter()
            .filter(|f| !BUILTIN_USER_FIELDS.contains(&f.name.as_str()))
            .collect()
    }
}

/// A custom field value, typed by its declared field kind
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Raw(Value),
}

impl UserField {
    /// Type a raw JSON value according to this field's kind
    pub fn value_of(&self, raw: Option<&Value>) -> FieldValue {
        match (raw, &self.kind) {
            (None | Some(Value::Null), _) => FieldValue::Null,
            (Some(Value::String(s)), UserFieldKind::Text) => FieldValue::Text(s.clone()),
            (Some(Value::Number(n)), UserFieldKind::Integer) if n.is_i64() => {
                FieldValue::Integer(n.as_i64().unwrap_or_default())
            }
            (Some(Value::Number(n)), UserFieldKind::Float) => FieldValue::Float(n.as_f64().unwrap_or_default()),
            (Some(Value::Bool(b)), UserFieldKind::Boolean) => FieldValue::Boolean(*b),
            (Some(other), _) => FieldValue::Raw(other.clone()),
        }
    }

    /// Parse form input for this field into the JSON the server expects
    ///
    /// # Errors
    /// * `StudioError::Validation` for empty non-nullable input, values outside
    ///   the field's enum, or text that does not parse as the field's kind
    pub fn parse_input(&self, input: &str) -> Result<Value> {
        let input = input.trim();
        if input.is_empty() {
            if self.nullable {
                return Ok(Value::Null);
            }
            return Err(StudioError::Validation(format!("{} is required", self.name)));
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| a == input) {
                return Err(StudioError::Validation(format!(
                    "{} must be one of: {}",
                    self.name,
                    allowed.join(", ")
                )));
            }
        }
        let invalid = || StudioError::Validation(format!("{} expects a {} value", self.name, String::from(self.kind.clone())));
        Ok(match self.kind {
            UserFieldKind::Integer => Value::from(input.parse::<i64>().map_err(|_| invalid())?),
            UserFieldKind::Float => Value::from(input.parse::<f64>().map_err(|_| invalid())?),
            UserFieldKind::Boolean => Value::from(input.parse::<bool>().map_err(|_| invalid())?),
            UserFieldKind::Text | UserFieldKind::Other(_) => Value::from(input),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub access_level: AccessLevel,
    #[serde(flatten)]
    pub custom_fields: Map<String, Value>,
}

impl User {
    pub fn field(&self, field: &UserField) -> FieldValue {
        field.value_of(self.custom_fields.get(&field.name))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub access_level: AccessLevel,
    #[serde(flatten)]
    pub custom_fields: Map<String, Value>,
}

fn users_path(project_path: &str) -> String {
    format!("{}/user-management/users", auth_path(project_path))
}

pub async fn list_users(client: &ApiClient, project_path: &str) -> Result<Vec<User>> {
    client.get_json(&users_path(project_path)).await
}

/// Custom user fields declared by the project, without the built-in ones
pub async fn user_fields(client: &ApiClient, project_path: &str) -> Result<Vec<UserField>> {
    let response: UserFieldsResponse = client
        .get_json(&format!("{}/user-management/user-fields", auth_path(project_path)))
        .await?;
    Ok(response.custom_fields())
}

pub async fn create_user(client: &ApiClient, project_path: &str, user: &NewUser) -> Result<()> {
    if user.username.trim().is_empty() || user.password.is_empty() {
        return Err(StudioError::Validation("Username and password cannot be empty".to_string()));
    }
    let _: Value = client.post_json(&users_path(project_path), user).await?;
    Ok(())
}

pub async fn update_user(client: &ApiClient, project_path: &str, user: &User) -> Result<()> {
    let path = format!("{}/{}", users_path(project_path), urlencoding::encode(&user.username));
    client.put_json(&path, user).await
}

/// Delete a user; refuses to delete the account that is logged in
pub async fn delete_user(client: &ApiClient, project_path: &str, username: &str) -> Result<()> {
    if client.context().username() == username {
        return Err(StudioError::Validation("You cannot delete your own account".to_string()));
    }
    let path = format!("{}/{}", users_path(project_path), urlencoding::encode(username));
    client.delete(&path).await
}
