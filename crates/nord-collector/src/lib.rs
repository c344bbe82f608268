//! Protocol adapters ("plugins") and the collection engine that drives
//! them.
//!
//! A [`Plugin`] answers commands and collect requests. The [`Registry`]
//! maps lowercase plugin names to instances; registration is an explicit
//! list assembled by the binary. Every invocation receives a
//! [`CollectorContext`] carrying the shared store and the registry, so
//! plugins hold no back-references.

pub mod collection;
pub mod local;
pub mod mail;
pub mod network;
pub mod perception;
pub mod remote;
pub mod snmp;
pub mod sshcollect;

use anyhow::Result;
use async_trait::async_trait;
use nord_common::config::Credential;
use nord_common::types::PluginResult;
use nord_storage::Store;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("plugin '{0}' not found")]
    PluginNotFound(String),
    #[error("{0}: credentials not provided")]
    CredentialsRequired(&'static str),
    #[error("timeout waiting for pattern: {pattern}")]
    WaitTimeout { pattern: String },
}

/// The host a task runs against, projected out of the configuration.
#[derive(Debug, Clone, Default)]
pub struct HostRef {
    pub key: String,
    pub name: String,
    pub address: String,
}

/// Options for one collect invocation.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    pub host: HostRef,
    /// The action token after the dot; "all" when absent.
    pub action: String,
    /// The dotted metric string as written in the task.
    pub metric: String,
    /// The credential reference named by the task, resolved or not.
    pub credential_name: Option<String>,
    /// The resolved credential bundle, when the reference resolved.
    pub credentials: Option<Credential>,
}

/// Shared state passed into every plugin invocation.
#[derive(Clone)]
pub struct CollectorContext {
    pub store: Option<Arc<Store>>,
    pub registry: Arc<Registry>,
}

/// A protocol adapter.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_command(
        &self,
        _ctx: &CollectorContext,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        anyhow::bail!(
            "unknown command for {} plugin: {:?}",
            self.name(),
            args.get("action")
        )
    }

    async fn on_collect(
        &self,
        _ctx: &CollectorContext,
        _options: &CollectOptions,
    ) -> Result<PluginResult> {
        anyhow::bail!("{} plugin does not collect", self.name())
    }
}

/// Plugin registry keyed by lowercase name. Read-only after startup.
#[derive(Default)]
pub struct Registry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_lowercase(), plugin);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }
}

/// Dispatch facade over the registry plus the shared store.
pub struct Controller {
    registry: Arc<Registry>,
    store: Option<Arc<Store>>,
}

impl Controller {
    pub fn new(registry: Registry, store: Option<Arc<Store>>) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
        }
    }

    pub fn context(&self) -> CollectorContext {
        CollectorContext {
            store: self.store.clone(),
            registry: self.registry.clone(),
        }
    }

    pub async fn on_command(&self, plugin: &str, args: &HashMap<String, String>) -> Result<()> {
        let target = self
            .registry
            .get(plugin)
            .ok_or_else(|| CollectorError::PluginNotFound(plugin.to_string()))?;
        target.on_command(&self.context(), args).await
    }

    pub async fn on_collect(&self, plugin: &str, options: &CollectOptions) -> Result<PluginResult> {
        let target = self
            .registry
            .get(plugin)
            .ok_or_else(|| CollectorError::PluginNotFound(plugin.to_string()))?;
        target.on_collect(&self.context(), options).await
    }
}

/// Dispatch a collect call through the registry from inside a plugin.
pub async fn dispatch_collect(
    ctx: &CollectorContext,
    plugin: &str,
    options: &CollectOptions,
) -> Result<PluginResult> {
    let target = ctx
        .registry
        .get(plugin)
        .ok_or_else(|| CollectorError::PluginNotFound(plugin.to_string()))?;
    target.on_collect(ctx, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    #[async_trait]
    impl Plugin for Dummy {
        fn name(&self) -> &'static str {
            "Dummy"
        }
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Dummy));

        assert!(registry.get("dummy").is_some());
        assert!(registry.get("Dummy").is_some());
        assert!(registry.get("DUMMY").is_some());
        assert!(registry.get("other").is_none());
    }

    #[tokio::test]
    async fn controller_reports_missing_plugin() {
        let controller = Controller::new(Registry::new(), None);
        let err = controller
            .on_command("nope", &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'nope' not found"));
    }

    #[tokio::test]
    async fn default_command_handler_rejects() {
        let controller = {
            let mut registry = Registry::new();
            registry.register(Arc::new(Dummy));
            Controller::new(registry, None)
        };
        let mut args = HashMap::new();
        args.insert("action".to_string(), "bogus".to_string());
        assert!(controller.on_command("dummy", &args).await.is_err());
    }
}
