use crate::dryrun::DryRunBackend;
use crate::error::BackendError;
use crate::Backend;
use indexmap::IndexMap;

pub type BackendFactory = fn() -> Box<dyn Backend>;

/// Maps backend identifiers to factories.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: IndexMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the backends shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DryRunBackend::NAME, || {
            Box::new(DryRunBackend::new()) as Box<dyn Backend>
        });
        registry
    }

    /// Register a factory; a later registration under the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Backend>, BackendError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BackendError::UnknownBackend {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        tracing::debug!(backend = name, "instantiating backend");
        Ok(factory())
    }
}
