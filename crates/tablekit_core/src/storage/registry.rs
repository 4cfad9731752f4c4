//! Type-keyed registry of repository and query components.

use crate::cache::short_type_name;
use crate::error::{ConfigError, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Kind of component a registry holds; selects the lookup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Repository,
    Query,
}

/// Registered components keyed by their capability type.
///
/// Capability types are usually `dyn Trait`; each entry stores an `Arc` of
/// that type so lookups hand out shared handles.
pub struct ComponentRegistry {
    kind: ComponentKind,
    components: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ComponentRegistry {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            components: HashMap::new(),
        }
    }

    /// Registers `component` as the implementation of capability `C`.
    pub fn register<C>(&mut self, component: Arc<C>) -> Result<()>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<C>();
        if self.components.contains_key(&key) {
            return Err(ConfigError::DuplicateComponent(short_type_name::<C>()).into());
        }
        self.components.insert(key, Box::new(component));
        Ok(())
    }

    /// Returns the component registered for capability `C`.
    pub fn resolve<C>(&self) -> Result<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.components
            .get(&TypeId::of::<C>())
            .and_then(|component| component.downcast_ref::<Arc<C>>())
            .cloned()
            .ok_or_else(|| {
                let name = short_type_name::<C>();
                match self.kind {
                    ComponentKind::Repository => ConfigError::UnregisteredRepository(name),
                    ComponentKind::Query => ConfigError::UnregisteredQuery(name),
                }
                .into()
            })
    }

    pub fn contains<C>(&self) -> bool
    where
        C: ?Sized + 'static,
    {
        self.components.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
