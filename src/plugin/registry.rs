//! Plugin trait and registry.

use std::sync::Arc;

use async_trait::async_trait;

use crate::server::{ExitReason, ServerError, ServerInstance};

/// Errors a plugin hook can report.
#[derive(thiserror::Error, Debug)]
pub enum PluginError {
    /// A server operation failed.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// The plugin failed for its own reasons.
    #[error("{0}")]
    Failed(String),
}

/// A unit of behaviour attached to a server instance.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used to enable the plugin in configuration.
    fn name(&self) -> &str;

    /// Called right after spawn, before the server is ready.
    async fn preinit(&self, _server: &ServerInstance) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once the server is ready.
    async fn init(&self, server: &ServerInstance) -> Result<(), PluginError>;

    /// Called after the server process has exited.
    async fn cleanup(&self, _server: &ServerInstance) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Ordered set of plugins run against one server.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in plugin.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        match super::ChatLog::new() {
            Ok(plugin) => registry.register(plugin),
            Err(e) => tracing::warn!(error = %e, "Failed to build chat-log plugin"),
        }
        registry.register(super::ReadyAnnounce);
        registry
    }

    /// Add a plugin. Hooks run in registration order.
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) {
        tracing::debug!(plugin = plugin.name(), "Registered plugin");
        self.plugins.push(Arc::new(plugin));
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Keep only the plugins named in `enabled`, in registry order.
    ///
    /// Unknown names are logged and ignored.
    #[must_use]
    pub fn select(&self, enabled: &[String]) -> Self {
        for name in enabled {
            if !self.plugins.iter().any(|p| p.name() == name) {
                tracing::warn!(plugin = %name, "Unknown plugin in configuration");
            }
        }

        Self {
            plugins: self
                .plugins
                .iter()
                .filter(|p| enabled.iter().any(|name| name == p.name()))
                .cloned()
                .collect(),
        }
    }

    /// Drive every plugin through the server lifecycle.
    ///
    /// Runs `preinit` immediately, `init` once the server is ready (skipped
    /// if it exits first) and `cleanup` after exit. A failing hook is logged
    /// and does not affect the other plugins or the server.
    pub async fn run(&self, server: &ServerInstance) -> ExitReason {
        for plugin in &self.plugins {
            if let Err(e) = plugin.preinit(server).await {
                tracing::warn!(plugin = plugin.name(), error = %e, "Plugin preinit failed");
            }
        }

        match server.ready().await {
            Ok(_) => {
                for plugin in &self.plugins {
                    if let Err(e) = plugin.init(server).await {
                        tracing::warn!(plugin = plugin.name(), error = %e, "Plugin init failed");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping plugin init"),
        }

        let reason = server.wait_stopped().await;

        for plugin in &self.plugins {
            if let Err(e) = plugin.cleanup(server).await {
                tracing::warn!(plugin = plugin.name(), error = %e, "Plugin cleanup failed");
            }
        }

        reason
    }
}
