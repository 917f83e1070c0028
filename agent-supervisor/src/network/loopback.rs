//! `route_localnet` sysctl control.

use std::path::PathBuf;

use tracing::debug;

use super::LoopbackRouting;
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};

/// Toggles `net.ipv4.conf.<iface>.route_localnet` so traffic arriving on the
/// container bridge may be routed to 127.0.0.0/8.
#[derive(Clone, Debug)]
pub struct RouteLocalNet {
    path: PathBuf,
}

impl RouteLocalNet {
    pub fn new(proc_sys_root: impl Into<PathBuf>, interface: &str) -> Self {
        let path = proc_sys_root
            .into()
            .join("net/ipv4/conf")
            .join(interface)
            .join("route_localnet");
        Self { path }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.proc_sys_root.clone(), &config.loopback_interface)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn set(&self, value: &str) -> Result<()> {
        tokio::fs::write(&self.path, value).await.map_err(|err| {
            SupervisorError::Network(format!(
                "failed to write {} to {}: {err}",
                value.trim(),
                self.path.display()
            ))
        })?;
        debug!("{} set to {}", self.path.display(), value.trim());
        Ok(())
    }
}

#[async_trait::async_trait]
impl LoopbackRouting for RouteLocalNet {
    async fn enable(&self) -> Result<()> {
        self.set("1\n").await
    }

    async fn restore_default(&self) -> Result<()> {
        self.set("0\n").await
    }
}
