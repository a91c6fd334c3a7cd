//! Service Registry
//!
//! An explicit, shareable registry of named services plus the plugins that
//! observe their client calls. Create one at startup, pass it where needed,
//! and [`Registry::clear`] it on teardown.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::resource::{Model, Service};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

/// Hooks around every client call made by a registered service
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called before the call; may rewrite the parameters or veto the call
    fn on_request(&self, _service: &str, _operation: &str, _params: &mut Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called with each successful response
    fn on_response(&self, _service: &str, _operation: &str, _response: &Value) {}
}

type Plugins = Arc<RwLock<Vec<Arc<dyn Plugin>>>>;

/// Client wrapper that runs the registry's current plugins
struct PluggedClient {
    service: String,
    inner: Arc<dyn Client>,
    plugins: Plugins,
}

impl PluggedClient {
    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Client for PluggedClient {
    async fn invoke(&self, operation: &str, mut params: Value) -> anyhow::Result<Value> {
        let plugins = self.snapshot();
        for plugin in &plugins {
            plugin.on_request(&self.service, operation, &mut params)?;
        }
        let response = self.inner.invoke(operation, params).await?;
        for plugin in &plugins {
            plugin.on_response(&self.service, operation, &response);
        }
        Ok(response)
    }
}

#[derive(Default)]
pub struct Registry {
    services: RwLock<IndexMap<String, Service>>,
    plugins: Plugins,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its service name, routing its client through
    /// the registry's plugins.
    pub fn add_service(&self, model: Model, client: Arc<dyn Client>) -> Result<Service> {
        let name = model.name().to_string();
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(&name) {
            return Err(Error::DuplicateService(name));
        }

        let client: Arc<dyn Client> = Arc::new(PluggedClient {
            service: name.clone(),
            inner: client,
            plugins: self.plugins.clone(),
        });
        let service = Service::new(model, client);
        services.insert(name.clone(), service.clone());

        tracing::info!(service = name.as_str(), "service registered");
        Ok(service)
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn remove_service(&self, name: &str) -> Option<Service> {
        let removed = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(name);
        if removed.is_some() {
            tracing::info!(service = name, "service removed");
        }
        removed
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Add a plugin. It applies to services already registered as well.
    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>) {
        tracing::info!(plugin = plugin.name(), "plugin added");
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    /// Remove every plugin with this name; returns whether any was removed
    pub fn remove_plugin(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        let before = plugins.len();
        plugins.retain(|p| p.name() != name);
        let removed = plugins.len() != before;
        if removed {
            tracing::info!(plugin = name, "plugin removed");
        }
        removed
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Drop every service and plugin
    pub fn clear(&self) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!("registry cleared");
    }
}
