//! Type-keyed lookup of node services.
//!
//! Populated once at startup and injected into the engine; there is no
//! global instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::NodeService;

/// Maps node type tags to their service.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn NodeService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `node_type`, returning any service it replaces.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        service: Arc<dyn NodeService>,
    ) -> Option<Arc<dyn NodeService>> {
        let node_type = node_type.into();
        debug!(node_type = %node_type, "registering node service");
        self.services.insert(node_type, service)
    }

    /// Register under the service's own [`NodeService::node_type`].
    pub fn register_service(&mut self, service: Arc<dyn NodeService>) -> Option<Arc<dyn NodeService>> {
        let node_type = service.node_type().to_owned();
        self.register(node_type, service)
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeService>> {
        self.services.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.services.contains_key(node_type)
    }

    /// Registered type tags, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.services.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.services.clear();
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
