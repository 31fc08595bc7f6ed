//! Service registry with async handlers for Autoflow
//!
//! This crate provides the ServiceRegistry, which manages all registered
//! services. Services are the sink that automation actions are dispatched
//! into (e.g., "light.turn_on").

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<(), ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// A call dispatched to a registered service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Domain the service belongs to (e.g., "light")
    pub domain: String,
    /// Service name (e.g., "turn_on")
    pub service: String,
    /// Service payload, including the target entity_id list
    pub data: serde_json::Value,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            data,
        }
    }

    /// Target entity ids from the payload, accepting a single string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Internal representation of a registered service
struct RegisteredService {
    handler: ServiceHandler,
}

/// The service registry manages all registered services
///
/// The ServiceRegistry is responsible for:
/// - Registering services with their handlers
/// - Calling services and routing to the appropriate handler
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a new service
    ///
    /// # Arguments
    /// * `domain` - The domain the service belongs to (e.g., "light")
    /// * `service` - The service name (e.g., "turn_on")
    /// * `handler` - Async function to handle service calls
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        let key = format!("{}.{}", domain, service);

        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(key, RegisteredService { handler });
    }

    /// Call a service
    #[instrument(skip(self, data))]
    pub async fn call(&self, domain: &str, service: &str, data: serde_json::Value) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let registered = self.services.get(&key).ok_or_else(|| {
            warn!(domain = %domain, service = %service, "Service not found");
            ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
        })?;

        let call = ServiceCall::new(domain, service, data);

        debug!(domain = %domain, service = %service, "Calling service");

        let handler = registered.handler.clone();
        drop(registered); // Release the lock before calling the handler

        handler(call).await
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        let key = format!("{}.{}", domain, service);
        self.services.contains_key(&key)
    }

    /// Unregister a service
    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let key = format!("{}.{}", domain, service);
        let removed = self.services.remove(&key).is_some();

        if removed {
            debug!(domain = %domain, service = %service, "Unregistered service");
        }

        removed
    }

    /// Get total number of registered services
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for ServiceRegistry
pub type SharedServiceRegistry = Arc<ServiceRegistry>;
