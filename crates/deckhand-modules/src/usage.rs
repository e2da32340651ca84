//! Hooks into the connection layer that runs modules

use crate::info::ModuleVersionKind;
use anyhow::Result;
use async_trait::async_trait;

/// Controls the connections that are running a module
///
/// The module index calls this when a version disappears or its files change
/// on disk. Implementations live with the connection layer.
#[async_trait]
pub trait ModuleUsageController: Send + Sync {
    /// Stop every connection running the given module version
    async fn stop_usages_of_module(&self, module_id: &str, kind: &ModuleVersionKind)
        -> Result<()>;

    /// Restart every connection running the given module
    async fn reload_usages_of_module(&self, module_id: &str) -> Result<()>;
}

/// Usage controller for setups without running connections
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUsageController;

#[async_trait]
impl ModuleUsageController for NoopUsageController {
    async fn stop_usages_of_module(
        &self,
        _module_id: &str,
        _kind: &ModuleVersionKind,
    ) -> Result<()> {
        Ok(())
    }

    async fn reload_usages_of_module(&self, _module_id: &str) -> Result<()> {
        Ok(())
    }
}
