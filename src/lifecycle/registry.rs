//! Component registry.
//!
//! # Responsibilities
//! - Hold every component the run phase will start, keyed by a stable id
//! - Preserve registration order for deterministic logging
//!
//! # Design Decisions
//! - First registration per id wins; later ones are ignored and reported
//! - Populated during configuration only; the run phase takes a frozen copy

use std::sync::Arc;

use crate::lifecycle::component::Component;

/// Well-known id of the HTTP server component.
pub const HTTP: &str = "http";

/// Well-known id of the job scheduler component.
pub const SCHEDULER: &str = "scheduler";

/// Ordered, de-duplicated set of components.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    entries: Vec<(String, Arc<dyn Component>)>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` under `id`. Returns `false` if the id was taken.
    pub fn register(&mut self, id: impl Into<String>, component: Arc<dyn Component>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            tracing::debug!(component = %id, "Component already registered, keeping the first");
            return false;
        }
        tracing::debug!(component = %id, "Component registered");
        self.entries.push((id, component));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Component>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, component)| component)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn entries(&self) -> &[(String, Arc<dyn Component>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
