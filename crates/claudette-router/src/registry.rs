//! The backend registry.
//!
//! Built once at initialization and never mutated during request handling;
//! the health poller and scorer borrow from it without taking ownership.

use claudette_backend::Backend;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate backend name {0:?}")]
    DuplicateName(String),
}

struct Entry {
    backend: Arc<dyn Backend>,
    priority: u32,
}

/// Immutable collection of registered backends, ordered by priority
/// (ascending number = higher priority) then name.
pub struct BackendRegistry {
    entries: Vec<Entry>,
}

impl BackendRegistry {
    /// Builds a registry, enforcing name uniqueness.
    pub fn new(backends: Vec<(Arc<dyn Backend>, u32)>) -> Result<Self, RegistryError> {
        let mut entries: Vec<Entry> = Vec::with_capacity(backends.len());
        for (backend, priority) in backends {
            if entries.iter().any(|e| e.backend.name() == backend.name()) {
                return Err(RegistryError::DuplicateName(backend.name().to_string()));
            }
            entries.push(Entry { backend, priority });
        }
        entries.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.backend.name().cmp(b.backend.name()))
        });
        Ok(Self { entries })
    }

    /// Looks a backend up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.entries
            .iter()
            .find(|e| e.backend.name() == name)
            .map(|e| &e.backend)
    }

    /// Backends in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.entries.iter().map(|e| &e.backend)
    }

    /// Registered names in priority order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.backend.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use claudette_backend::{BackendResponse, CapabilityProfile};
    use claudette_core::{ChatRequest, SendError};
    use std::time::Duration;

    struct NamedBackend {
        name: String,
        profile: CapabilityProfile,
    }

    #[async_trait]
    impl Backend for NamedBackend {
        fn name(&self) -> &str {
            &self.name
        }
        fn model(&self) -> &str {
            "m"
        }
        fn profile(&self) -> &CapabilityProfile {
            &self.profile
        }
        async fn is_available(&self, _deadline: Duration) -> bool {
            true
        }
        fn estimate_cost(&self, _tokens: u32) -> f64 {
            0.0
        }
        fn latency_score(&self) -> f64 {
            1.0
        }
        async fn send(
            &self,
            _request: &ChatRequest,
            _deadline: Duration,
        ) -> Result<BackendResponse, SendError> {
            unreachable!()
        }
    }

    fn named(name: &str) -> Arc<dyn Backend> {
        Arc::new(NamedBackend {
            name: name.into(),
            profile: CapabilityProfile::openai(),
        })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = BackendRegistry::new(vec![(named("b1"), 1), (named("b1"), 2)]);
        assert_eq!(result.err(), Some(RegistryError::DuplicateName("b1".into())));
    }

    #[test]
    fn iteration_follows_priority_then_name() {
        let registry = BackendRegistry::new(vec![
            (named("zeta"), 2),
            (named("beta"), 1),
            (named("alpha"), 2),
        ])
        .unwrap();
        assert_eq!(registry.names(), vec!["beta", "alpha", "zeta"]);
    }

    #[test]
    fn lookup_by_name() {
        let registry = BackendRegistry::new(vec![(named("b1"), 1)]).unwrap();
        assert!(registry.get("b1").is_some());
        assert!(registry.get("nope").is_none());
    }
}
