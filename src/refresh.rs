//! Cascading parameter refresh.
//!
//! When a provoker widget changes, one request asks the server for the new
//! state of every widget that depends on it, directly or transitively. The
//! engine never owns the parameter store: it hands a [`Merge`] to a mutator
//! callback supplied by whoever does.
//!
//! Tickets are checked whether the request succeeds or fails, so a superseded
//! refresh neither merges nor reports an error. The explorer drives refreshes
//! through `&mut self`, which serializes them for one explorer; overlap only
//! happens when several tasks share an engine.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::catalog::ParametersResponse;
use crate::client::ApiClient;
use crate::error::Result;
use crate::parameter::Parameter;
use crate::request::build_refresh_url;
use crate::store::ParameterStore;

/// Updated parameters waiting to be merged into a store
#[derive(Clone, Debug, PartialEq)]
pub struct Merge {
    pub provoker: String,
    pub updates: Vec<Parameter>,
}

impl Merge {
    pub fn apply_to(&self, store: &ParameterStore) -> ParameterStore {
        store.merge_by_name(&self.updates)
    }
}

/// What happened to one refresh request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Response merged; carries the names the server sent back
    Applied(Vec<String>),
    /// A newer refresh for the same provoker was issued first
    Stale,
}

/// Issues per-provoker sequence numbers so late responses can be dropped
#[derive(Debug, Default)]
pub struct RefreshSequencer {
    next: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshTicket {
    provoker: String,
    seq: u64,
}

impl RefreshSequencer {
    pub fn begin(&self, provoker: &str) -> RefreshTicket {
        let seq = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut latest) = self.latest.lock() {
            latest.insert(provoker.to_string(), seq);
        }
        RefreshTicket {
            provoker: provoker.to_string(),
            seq,
        }
    }

    pub fn is_current(&self, ticket: &RefreshTicket) -> bool {
        match self.latest.lock() {
            Ok(latest) => latest.get(&ticket.provoker) == Some(&ticket.seq),
            Err(_) => true,
        }
    }
}

pub struct RefreshEngine {
    sequencer: RefreshSequencer,
}

impl Default for RefreshEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshEngine {
    pub fn new() -> Self {
        RefreshEngine {
            sequencer: RefreshSequencer::default(),
        }
    }

    /// Fetch the dependents of `provoker` and merge them through `mutator`
    ///
    /// # Arguments
    /// * `client` - Transport; its context supplies auth and the loading flag
    /// * `parameters_path` - Parameters endpoint of the current data object
    /// * `provoker` - The widget whose selection changed
    /// * `selection` - Its new values
    /// * `mutator` - Called once with the merge when the response is current
    ///
    /// # Errors
    /// Any transport, auth, or server error; the mutator is not called and the
    /// caller decides how to surface the failure.
    pub async fn refresh<F>(
        &self,
        client: &ApiClient,
        parameters_path: &str,
        provoker: &str,
        selection: &[String],
        mutator: F,
    ) -> Result<RefreshOutcome>
    where
        F: FnOnce(Merge),
    {
        let ticket = self.sequencer.begin(provoker);
        let url = build_refresh_url(parameters_path, provoker, selection);
        log::debug!("refreshing dependents of '{}'", provoker);

        let response: Result<ParametersResponse> = client.get_json(&url).await;

        if !self.sequencer.is_current(&ticket) {
            match &response {
                Ok(_) => log::debug!("dropping stale refresh #{} for '{}'", ticket.seq, provoker),
                Err(e) => log::debug!("ignoring failure of stale refresh #{} for '{}': {}", ticket.seq, provoker, e),
            }
            return Ok(RefreshOutcome::Stale);
        }
        let response = response?;

        let names = response.parameters.iter().map(|p| p.name.clone()).collect();
        mutator(Merge {
            provoker: provoker.to_string(),
            updates: response.parameters,
        });
        Ok(RefreshOutcome::Applied(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_tracks_latest_per_provoker() {
        let seq = RefreshSequencer::default();
        let first = seq.begin("region");
        let other = seq.begin("year");
        assert!(seq.is_current(&first));
        let second = seq.begin("region");
        assert!(!seq.is_current(&first));
        assert!(seq.is_current(&second));
        assert!(seq.is_current(&other));
    }
}
