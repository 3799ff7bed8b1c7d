use std::collections::HashSet;

use crate::error::{Result, StudioError};
use crate::parameter::Parameter;
use crate::request::Selections;

/// The current parameter form, in display order
///
/// Owned by the explorer. Merges return a new store so an observer holding the
/// previous value can compare the two.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterStore {
    params: Vec<Parameter>,
}

impl ParameterStore {
    pub fn new(params: Vec<Parameter>) -> Self {
        let mut store = ParameterStore::default();
        store.replace_all(params);
        store
    }

    /// Discard everything and install `params` in the given order
    ///
    /// Used on a data-object context switch. Later duplicates of a name are
    /// dropped so names stay unique.
    pub fn replace_all(&mut self, params: Vec<Parameter>) {
        let mut seen = HashSet::new();
        self.params = params
            .into_iter()
            .filter(|p| {
                let fresh = seen.insert(p.name.clone());
                if !fresh {
                    log::warn!("dropping duplicate parameter '{}'", p.name);
                }
                fresh
            })
            .map(Parameter::normalize)
            .collect();
    }

    /// Replace entries whose name matches an update, keeping their positions
    ///
    /// # Arguments
    /// * `updates` - Parameters returned by a refresh request
    ///
    /// # Returns
    /// * `ParameterStore` - A new store; updates naming unknown parameters are dropped
    pub fn merge_by_name(&self, updates: &[Parameter]) -> ParameterStore {
        let mut params = self.params.clone();
        for update in updates {
            match params.iter().position(|p| p.name == update.name) {
                Some(index) => params[index] = update.clone().normalize(),
                None => log::debug!("ignoring update for unknown parameter '{}'", update.name),
            }
        }
        ParameterStore { params }
    }

    pub fn to_selections_map(&self) -> Selections {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.current_selection()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Apply a widget change event to one parameter in place
    ///
    /// # Errors
    /// * `StudioError::InvalidSelection` if the name is unknown or the values are rejected
    pub fn set_selection(&mut self, name: &str, values: &[String]) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| StudioError::invalid_selection(name, "no such parameter"))?;
        param.set_selection(values)
    }

    /// Parameters that list `name` among their parents
    pub fn dependents_of(&self, name: &str) -> Vec<&Parameter> {
        self.params
            .iter()
            .filter(|p| p.parent_names.contains(name))
            .collect()
    }

    /// Every parameter reachable from `name` through parent links, in discovery order
    ///
    /// The server authors the graph; a visited set keeps a malformed cycle from looping.
    pub fn descendants_of(&self, name: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(name);
        let mut stack = vec![name];

        while let Some(current) = stack.pop() {
            for child in self.dependents_of(current) {
                if visited.insert(child.name.as_str()) {
                    found.push(child.name.clone());
                    stack.push(child.name.as_str());
                }
            }
        }
        found
    }

    /// Whether changing `name` should ask the server for updated children
    pub fn triggers_refresh(&self, name: &str) -> bool {
        match self.get(name) {
            Some(p) => p.trigger_refresh || !self.dependents_of(name).is_empty(),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(name: &str, parents: &[&str], selected: &str) -> Parameter {
        serde_json::from_value(json!({
            "widget_type": "single_select",
            "name": name,
            "parent_names": parents,
            "options": [{"id": selected}, {"id": "other"}],
            "selected_id": selected
        }))
        .unwrap()
    }

    #[test]
    fn test_descendants_follow_parent_links() {
        let store = ParameterStore::new(vec![
            param("country", &[], "US"),
            param("state", &["country"], "CA"),
            param("city", &["state"], "LA"),
            param("unrelated", &[], "x"),
        ]);
        assert_eq!(store.descendants_of("country"), vec!["state", "city"]);
        assert!(store.triggers_refresh("country"));
        assert!(!store.triggers_refresh("city"));
        assert!(!store.triggers_refresh("missing"));
    }

    #[test]
    fn test_descendants_survive_a_cycle() {
        let store = ParameterStore::new(vec![param("a", &["b"], "1"), param("b", &["a"], "2")]);
        assert_eq!(store.descendants_of("a"), vec!["b"]);
    }

    #[test]
    fn test_replace_all_drops_duplicate_names() {
        let store = ParameterStore::new(vec![param("a", &[], "1"), param("a", &[], "2")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().current_selection(), vec!["1"]);
    }

    #[test]
    fn test_set_selection_unknown_name() {
        let mut store = ParameterStore::new(vec![param("a", &[], "1")]);
        assert!(store.set_selection("b", &["1".into()]).is_err());
        store.set_selection("a", &["other".into()]).unwrap();
        assert_eq!(store.to_selections_map().get("a"), Some(&["other".to_string()][..]));
    }
}
