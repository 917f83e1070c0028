//! Lifecycle engine for the supervised agent.
//!
//! The service manager drives one session as
//! `pre_start` → `start_supervised` → `pre_stop` → `post_stop`, one call per
//! process invocation. The engine trusts that ordering and keeps no state of
//! its own beyond the collaborators.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::agent::{AgentExitCode, AgentRuntime};
use crate::config::SupervisorConfig;
use crate::docker::DockerAgentClient;
use crate::error::{Result, SupervisorError};
use crate::network::{CredentialsProxyRoute, LoopbackRouting, NetfilterRoute, RouteLocalNet};

/// Exit status assumed before the agent has run at all.
const NOT_STARTED_EXIT_CODE: i64 = -1;

pub struct Engine {
    agent: Arc<dyn AgentRuntime>,
    loopback_routing: Arc<dyn LoopbackRouting>,
    credentials_proxy_route: Arc<dyn CredentialsProxyRoute>,
}

impl Engine {
    /// Wire the Docker agent client and host network collaborators.
    pub async fn new(config: &SupervisorConfig) -> Result<Self> {
        let agent = DockerAgentClient::connect(config.clone()).await?;
        Ok(Self::with_collaborators(
            Arc::new(agent),
            Arc::new(RouteLocalNet::from_config(config)),
            Arc::new(NetfilterRoute::from_config(config)),
        ))
    }

    pub fn with_collaborators(
        agent: Arc<dyn AgentRuntime>,
        loopback_routing: Arc<dyn LoopbackRouting>,
        credentials_proxy_route: Arc<dyn CredentialsProxyRoute>,
    ) -> Self {
        Self {
            agent,
            loopback_routing,
            credentials_proxy_route,
        }
    }

    /// Prepare the host: loopback routing, the credentials redirect, and the
    /// agent image. Stops at the first failure without undoing earlier steps;
    /// `post_stop` is the cleanup path.
    pub async fn pre_start(&self) -> Result<()> {
        self.loopback_routing
            .enable()
            .await
            .map_err(|err| SupervisorError::engine("could not enable loopback routing", err))?;

        self.credentials_proxy_route.create().await.map_err(|err| {
            SupervisorError::engine("could not create route to the credentials proxy", err)
        })?;

        self.agent.check_and_load_image().await
    }

    /// Run the agent until it exits with a terminal code.
    ///
    /// Every non-terminal exit restarts the agent immediately, with no retry
    /// limit. An upgrade exit pulls the image first; a failed pull is logged
    /// and the agent restarts on the image it has.
    pub async fn start_supervised(&self) -> Result<()> {
        let mut exit_code = AgentExitCode::from(NOT_STARTED_EXIT_CODE);
        while !exit_code.is_terminal() {
            self.agent
                .remove_existing_agent_container()
                .await
                .map_err(|err| {
                    SupervisorError::engine("could not remove existing Agent container", err)
                })?;

            info!("Starting Amazon EC2 Container Service Agent");
            let status = self
                .agent
                .start_agent()
                .await
                .map_err(|err| SupervisorError::engine("could not start Agent", err))?;
            exit_code = AgentExitCode::from(status);
            info!("Agent exited with code {exit_code}");

            if exit_code == AgentExitCode::Upgrade {
                if let Err(err) = self.agent.download_agent_image().await {
                    error!("could not upgrade agent: {err}");
                }
            }
        }

        match exit_code {
            AgentExitCode::Failure => Err(SupervisorError::TerminalExit),
            _ => Ok(()),
        }
    }

    /// Stop the running agent container.
    pub async fn pre_stop(&self) -> Result<()> {
        info!("Stopping Amazon EC2 Container Service Agent");
        self.agent.stop_agent().await.map_err(|err| {
            SupervisorError::engine("could not stop Amazon EC2 Container Service Agent", err)
        })
    }

    /// Undo `pre_start`'s network setup. Only the loopback restore outcome is
    /// reported, wrapped as an [`SupervisorError::Engine`] error
    /// ("could not restore default loopback routing") whose source is the
    /// restore failure.
    pub async fn post_stop(&self) -> Result<()> {
        info!("Cleaning up the credentials endpoint setup for Amazon EC2 Container Service Agent");
        let restored = self.loopback_routing.restore_default().await;
        self.remove_credentials_route_best_effort().await;
        restored.map_err(|err| {
            SupervisorError::engine("could not restore default loopback routing", err)
        })
    }

    /// Reload the agent image from the on-disk cache.
    pub async fn reload_cache(&self) -> Result<()> {
        info!("Reloading Amazon EC2 Container Service Agent from cache");
        self.agent.load_cached_image().await.map_err(|err| {
            SupervisorError::engine(
                "could not load Amazon EC2 Container Service Agent from cache",
                err,
            )
        })
    }

    /// The rule is absent whenever `pre_start` failed before creating it, so
    /// a removal failure here is expected and never reported.
    async fn remove_credentials_route_best_effort(&self) {
        if let Err(err) = self.credentials_proxy_route.remove().await {
            warn!("ignoring credentials proxy route removal failure: {err}");
        }
    }
}
