//! Host network preparation so containers can reach the agent's
//! credentials endpoint.
//!
//! Two reversible pieces of host state are involved:
//! - loopback routing on the container bridge ([`LoopbackRouting`])
//! - a nat redirect from the well-known credentials address to the agent
//!   ([`CredentialsProxyRoute`])
//!
//! Both concrete implementations set the host to a target state, so repeating
//! an operation is harmless.

pub mod exec;
pub mod loopback;
pub mod netfilter;

pub use exec::{CommandRunner, SystemCommandRunner};
pub use loopback::RouteLocalNet;
pub use netfilter::NetfilterRoute;

use crate::error::Result;

#[async_trait::async_trait]
pub trait LoopbackRouting: Send + Sync {
    /// Allow routing to loopback addresses from the container bridge.
    async fn enable(&self) -> Result<()>;

    /// Put loopback routing back to the kernel default (disabled).
    async fn restore_default(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait CredentialsProxyRoute: Send + Sync {
    /// Install the redirect rule.
    async fn create(&self) -> Result<()>;

    /// Delete the redirect rule. Fails if the rule is not installed.
    async fn remove(&self) -> Result<()>;
}
