//! Shared application state handed to every component that needs it.
//!
//! There is no global: the binary builds one [`AppContext`] and passes an
//! `Arc` of it to the client and the explorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::StudioError;

/// An authenticated user; guests have no session at all
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub access_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub is_admin: bool,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if expiry <= now)
    }
}

/// A modal-style message for the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
    /// The user is being logged out once this is dismissed
    pub logout: bool,
}

impl Notice {
    pub fn new(title: &str, message: impl Into<String>) -> Self {
        Notice {
            title: title.to_string(),
            message: message.into(),
            logout: false,
        }
    }
}

/// Where notices end up: a terminal, a dialog, or a test recorder
pub trait Notifier: Send + Sync {
    fn show(&self, notice: Notice);
}

/// Writes notices to stderr
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn show(&self, notice: Notice) {
        eprintln!("[{}] {}", notice.title, notice.message);
    }
}

/// Keeps every notice; handy for tests and for batch runs
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

pub struct AppContext {
    session: RwLock<Option<Session>>,
    /// Bumped every time the session is cleared; the client drops its cookies when it changes
    session_epoch: AtomicU64,
    in_flight: AtomicUsize,
    notifier: Arc<dyn Notifier>,
}

/// Marks one request as in flight until dropped
///
/// Dropping happens on every exit path, so a failed or panicking request never
/// leaves the loading overlay stuck on.
pub struct LoadingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AppContext {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        AppContext {
            session: RwLock::new(None),
            session_epoch: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            notifier,
        }
    }

    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        LoadingGuard {
            counter: &self.in_flight,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Locally known username; empty for guests
    pub fn username(&self) -> String {
        self.session().map(|s| s.username).unwrap_or_default()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().and_then(|s| s.access_token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.session().map(|s| s.is_admin).unwrap_or(false)
    }

    pub fn set_session(&self, session: Option<Session>) {
        let cleared = session.is_none();
        if let Ok(mut current) = self.session.write() {
            *current = session;
        }
        if cleared {
            self.session_epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Changes whenever the session is cleared by logout, forced logout, or a new login
    pub fn session_epoch(&self) -> u64 {
        self.session_epoch.load(Ordering::SeqCst)
    }

    pub fn notify(&self, notice: Notice) {
        self.notifier.show(notice);
    }

    /// Drop the session and tell the user why
    pub fn force_logout(&self, title: &str, message: &str) {
        log::warn!("forcing logout: {}", message);
        self.set_session(None);
        self.notify(Notice {
            title: title.to_string(),
            message: message.to_string(),
            logout: true,
        });
    }

    /// Turn a failed call into the user-visible notice for it
    ///
    /// Session invalidation also clears the session. Unexpected failures are
    /// logged in full but shown generically.
    pub fn surface(&self, error: &StudioError) {
        match error {
            StudioError::SessionInvalidated { expected, applied } => {
                log::warn!(
                    "server applied user {:?}, expected '{}'",
                    applied,
                    expected
                );
                self.force_logout(
                    "Session Invalidated",
                    "User session was invalidated by the server... Logging out.",
                );
            }
            StudioError::AuthRequired => {
                self.notify(Notice::new("Unauthorized", error.to_string()));
            }
            StudioError::Server { status, message } => {
                log::info!("server returned {}: {}", status, message);
                self.notify(Notice::new("Error", message.clone()));
            }
            e if e.is_unexpected() => {
                log::error!("{}", e);
                self.notify(Notice::new("Error", "An unexpected error occurred"));
            }
            e => self.notify(Notice::new("Error", e.to_string())),
        }
    }
}
