//! Supervisor for a long-running containerized agent.
//!
//! This crate provides the lifecycle engine (host preparation, supervised
//! run-with-restart, stop, cleanup) and the collaborators it drives: a Docker
//! client for the agent container and host network configuration for the
//! agent's credentials endpoint.

pub mod agent;
pub mod config;
pub mod docker;
pub mod engine;
pub mod error;
pub mod network;
pub mod util;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use std::net::Ipv4Addr;

pub use agent::{AgentExitCode, AgentRuntime};
pub use config::SupervisorConfig;
pub use engine::Engine;
pub use error::{Result, SupervisorError};
pub use network::{CredentialsProxyRoute, LoopbackRouting};

pub const DEFAULT_AGENT_IMAGE: &str = "amazon/amazon-ecs-agent:latest";
pub const DEFAULT_AGENT_CONTAINER_NAME: &str = "ecs-agent";
pub const DEFAULT_AGENT_IMAGE_CACHE: &str = "/var/cache/ecs/ecs-agent.tar";
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOOPBACK_INTERFACE: &str = "docker0";
pub const DEFAULT_CREDENTIALS_PROXY_IP: Ipv4Addr = Ipv4Addr::new(169, 254, 170, 2);
pub const DEFAULT_CREDENTIALS_PROXY_PORT: u16 = 80;
pub const DEFAULT_AGENT_CREDENTIALS_PORT: u16 = 51679;
