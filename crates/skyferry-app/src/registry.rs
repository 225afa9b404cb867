//! Capability-based lookup of transfer services.

use std::sync::Arc;

use skyferry_core::{TransferRequest, TransferService};
use tracing::debug;

/// Ordered set of transfer services; the first one that can handle a request wins.
#[derive(Clone, Default)]
pub struct TransferServiceRegistry {
    services: Vec<Arc<dyn TransferService>>,
}

impl TransferServiceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a service. Earlier registrations take precedence.
    pub fn register(&mut self, service: Arc<dyn TransferService>) {
        debug!(service = service.name(), "transfer service registered");
        self.services.push(service);
    }

    /// First service whose `can_handle` accepts the request.
    #[must_use]
    pub fn resolve(&self, request: &TransferRequest) -> Option<Arc<dyn TransferService>> {
        self.services
            .iter()
            .find(|service| service.can_handle(request))
            .cloned()
    }

    /// Names of the registered services, in precedence order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.services.iter().map(|service| service.name()).collect()
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
