//! Service registry with async handlers

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hass_ai_core::{ServiceCallError, ServiceCaller};
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Result of one service call
pub type ServiceResult = Result<Option<Value>, ServiceCallError>;

/// Future returned by a service handler
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Boxed service handler
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// A call as seen by the handler
#[derive(Debug, Clone)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
}

/// Registered services keyed by `domain.service`
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    #[instrument(skip(self, handler))]
    pub fn register<F, Fut>(&self, domain: &str, service: &str, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        debug!("registering service");
        let handler: ServiceHandler = Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(format!("{domain}.{service}"), handler);
    }

    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        self.services.remove(&format!("{domain}.{service}")).is_some()
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{domain}.{service}"))
    }

    /// Registered `domain.service` names, sorted
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    #[instrument(skip(self, data))]
    pub async fn call(&self, domain: &str, service: &str, data: Value) -> ServiceResult {
        let handler = self
            .services
            .get(&format!("{domain}.{service}"))
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!("service not found");
                ServiceCallError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        debug!("calling service");
        handler(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        })
        .await
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceCaller for ServiceRegistry {
    async fn call_service(&self, domain: &str, service: &str, data: Value) -> ServiceResult {
        self.call(domain, service, data).await
    }
}
