//! iptables DNAT rule routing credential requests to the agent.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::debug;

use super::CredentialsProxyRoute;
use super::exec::{CommandRunner, SystemCommandRunner};
use crate::config::SupervisorConfig;
use crate::error::Result;

const IPTABLES: &str = "iptables";

/// Redirects `<proxy_ip>:<proxy_port>` to the agent's credentials listener
/// on localhost via a nat `PREROUTING` DNAT rule.
pub struct NetfilterRoute {
    runner: Arc<dyn CommandRunner>,
    proxy_ip: Ipv4Addr,
    proxy_port: u16,
    agent_port: u16,
}

impl NetfilterRoute {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        proxy_ip: Ipv4Addr,
        proxy_port: u16,
        agent_port: u16,
    ) -> Self {
        Self {
            runner,
            proxy_ip,
            proxy_port,
            agent_port,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(
            Arc::new(SystemCommandRunner),
            config.credentials_proxy_ip,
            config.credentials_proxy_port,
            config.agent_credentials_port,
        )
    }

    /// Full iptables argument list for `action` (`-A`, `-C` or `-D`).
    pub fn rule_args(&self, action: &str) -> Vec<String> {
        vec![
            "-t".into(),
            "nat".into(),
            action.into(),
            "PREROUTING".into(),
            "-d".into(),
            format!("{}/32", self.proxy_ip),
            "-p".into(),
            "tcp".into(),
            "-m".into(),
            "tcp".into(),
            "--dport".into(),
            self.proxy_port.to_string(),
            "-j".into(),
            "DNAT".into(),
            "--to-destination".into(),
            format!("127.0.0.1:{}", self.agent_port),
        ]
    }
}

#[async_trait::async_trait]
impl CredentialsProxyRoute for NetfilterRoute {
    async fn create(&self) -> Result<()> {
        // -C fails when the rule is absent.
        if self.runner.run(IPTABLES, &self.rule_args("-C")).await.is_ok() {
            debug!("credentials proxy rule already present");
            return Ok(());
        }
        self.runner.run(IPTABLES, &self.rule_args("-A")).await
    }

    async fn remove(&self) -> Result<()> {
        self.runner.run(IPTABLES, &self.rule_args("-D")).await
    }
}
