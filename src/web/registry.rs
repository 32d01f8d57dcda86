//! Named routes
//!
//! Filled while routes are declared at startup, then frozen into
//! `AppState` and only read for redirect resolution.

use std::collections::HashMap;

/// Symbolic route name -> literal path
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    names: HashMap<String, String>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `name` with `path`; a repeated name overwrites the old path
    pub fn register(&mut self, name: &str, path: &str) {
        if let Some(previous) = self.names.insert(name.to_string(), path.to_string()) {
            if previous != path {
                tracing::warn!(
                    name,
                    previous = %previous,
                    path,
                    "Route name re-registered with a different path"
                );
            }
        }
    }

    /// Registered path for `name`
    pub fn path(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    /// Registered path for `target`, or `target` itself when it is not a name
    pub fn resolve<'a>(&'a self, target: &'a str) -> &'a str {
        self.path(target).unwrap_or(target)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
