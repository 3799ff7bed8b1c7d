use reqwest::{RequestBuilder, StatusCode, multipart};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};

use crate::context::AppContext;
use crate::error::{Result, StudioError};

/// Response header naming the identity the server acted as
pub const APPLIED_USERNAME: &str = "Applied-Username";

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
    detail: Option<String>,
}

/// HTTP transport for one Squirrels host
///
/// Every call holds a loading guard for its full duration, sends the bearer
/// token when the session has one, keeps cookies between calls, and turns
/// non-success statuses into [`StudioError`] values. There are no retries.
///
/// Cookies belong to one session: once the context's session epoch moves
/// (logout, forced logout, new login) the next call starts from an empty jar.
pub struct ApiClient {
    host: String,
    http: RwLock<CookieSession>,
    ctx: Arc<AppContext>,
}

struct CookieSession {
    epoch: u64,
    client: reqwest::Client,
}

fn build_http() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().cookie_store(true).build()?)
}

impl ApiClient {
    pub fn new(host: &str, ctx: Arc<AppContext>) -> Result<Self> {
        let http = CookieSession {
            epoch: ctx.session_epoch(),
            client: build_http()?,
        };
        Ok(ApiClient {
            host: host.trim_end_matches('/').to_string(),
            http: RwLock::new(http),
            ctx,
        })
    }

    /// reqwest client for the current session, rebuilt with a fresh cookie jar after the session ends
    fn http(&self) -> Result<reqwest::Client> {
        let epoch = self.ctx.session_epoch();
        if let Ok(current) = self.http.read() {
            if current.epoch == epoch {
                return Ok(current.client.clone());
            }
        }
        let client = build_http()?;
        if let Ok(mut current) = self.http.write() {
            log::debug!("session ended; dropping cookies from epoch {}", current.epoch);
            *current = CookieSession {
                epoch,
                client: client.clone(),
            };
        }
        Ok(client)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Absolute URL for a server path; already-absolute URLs pass through
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.host, path)
        }
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.execute(self.http()?.get(self.url(path))).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_bytes(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = self.execute(self.http()?.post(self.url(path)).json(body)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        self.execute(self.http()?.put(self.url(path)).json(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(self.http()?.delete(self.url(path))).await?;
        Ok(())
    }

    pub async fn post_form(&self, path: &str, form: multipart::Form) -> Result<Vec<u8>> {
        self.execute(self.http()?.post(self.url(path)).multipart(form)).await
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        let _loading = self.ctx.begin_loading();

        let request = match self.ctx.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        log::debug!("{} {}", status.as_u16(), response.url());

        let applied = response
            .headers()
            .get(APPLIED_USERNAME)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        check_applied_username(&self.ctx.username(), applied.as_deref(), status)?;

        if status.is_success() {
            return Ok(response.bytes().await?.to_vec());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(StudioError::AuthRequired);
        }

        let body = response.bytes().await?;
        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.detail))
            .unwrap_or_else(|| "An error occurred".to_string());
        Err(StudioError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Detect a session the server no longer honours
///
/// The header is absent for endpoints that ignore auth and for some error
/// statuses; a 401 while logged in means the token stopped working. Either
/// way a logged-in user acting as anyone else is invalidated.
pub fn check_applied_username(local: &str, applied: Option<&str>, status: StatusCode) -> Result<()> {
    let has_applied = applied.is_some() || status == StatusCode::UNAUTHORIZED;
    if has_applied && !local.is_empty() && applied != Some(local) {
        return Err(StudioError::SessionInvalidated {
            expected: local.to_string(),
            applied: applied.map(str::to_string),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_username_rules() {
        assert!(check_applied_username("", None, StatusCode::UNAUTHORIZED).is_ok());
        assert!(check_applied_username("", Some("bob"), StatusCode::OK).is_ok());
        assert!(check_applied_username("alice", None, StatusCode::OK).is_ok());
        assert!(check_applied_username("alice", Some("alice"), StatusCode::OK).is_ok());
        assert!(matches!(
            check_applied_username("alice", Some("bob"), StatusCode::OK),
            Err(StudioError::SessionInvalidated { .. })
        ));
        assert!(matches!(
            check_applied_username("alice", None, StatusCode::UNAUTHORIZED),
            Err(StudioError::SessionInvalidated { applied: None, .. })
        ));
    }
}
