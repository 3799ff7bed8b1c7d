use thiserror::Error;

/// Every failure the studio engine can report
///
/// Network-originated errors are terminal at the call site: the explorer hands
/// them to [`crate::context::AppContext::surface`] and never retries.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("This resource requires authentication")]
    AuthRequired,

    #[error("User session was invalidated by the server")]
    SessionInvalidated {
        expected: String,
        applied: Option<String>,
    },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file: {0}")]
    Persist(#[from] bincode::Error),

    #[error(
        "Squirrels Studio requires your project's Squirrels version to be 0.5.0 or higher. The Squirrels version used by this project is: {0}"
    )]
    UnsupportedVersion(String),

    #[error("invalid selection for parameter '{name}': {reason}")]
    InvalidSelection { name: String, reason: String },

    #[error("{0}")]
    Validation(String),

    #[error("no project is open")]
    NoProject,
}

impl StudioError {
    pub fn invalid_selection(name: &str, reason: impl Into<String>) -> Self {
        StudioError::InvalidSelection {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures the user should only see as "An unexpected error occurred"
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            StudioError::Http(_)
                | StudioError::Json(_)
                | StudioError::Base64(_)
                | StudioError::Io(_)
                | StudioError::Persist(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
