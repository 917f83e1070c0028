//! Supervisor configuration, read from environment variables.

use once_cell::sync::OnceCell;
use std::env;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SupervisorError};
use crate::util::{env_vars_from_json, parse_binds};
use crate::{
    DEFAULT_AGENT_CONTAINER_NAME, DEFAULT_AGENT_CREDENTIALS_PORT, DEFAULT_AGENT_IMAGE,
    DEFAULT_AGENT_IMAGE_CACHE, DEFAULT_CREDENTIALS_PROXY_IP, DEFAULT_CREDENTIALS_PROXY_PORT,
    DEFAULT_LOOPBACK_INTERFACE, DEFAULT_STOP_TIMEOUT_SECS,
};

const DEFAULT_AGENT_BINDS: &str = "/var/run/docker.sock:/var/run/docker.sock,\
/var/log/ecs:/log,\
/var/lib/ecs/data:/data,\
/etc/ecs:/etc/ecs";

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub agent_image: String,
    pub agent_container_name: String,
    /// Image tarball loaded when the image is absent from the local cache.
    pub agent_image_cache: PathBuf,
    /// `KEY=VALUE` env vars passed to the agent container.
    pub agent_env: Vec<String>,
    pub agent_binds: Vec<String>,
    pub stop_timeout: Duration,
    pub docker_host: Option<String>,
    pub loopback_interface: String,
    pub proc_sys_root: PathBuf,
    pub credentials_proxy_ip: Ipv4Addr,
    pub credentials_proxy_port: u16,
    pub agent_credentials_port: u16,
}

static SUPERVISOR_CONFIG: OnceCell<SupervisorConfig> = OnceCell::new();

impl SupervisorConfig {
    /// Load configuration from environment variables.
    /// Cached after the first successful call.
    pub fn load() -> Result<&'static SupervisorConfig> {
        SUPERVISOR_CONFIG.get_or_try_init(Self::from_env)
    }

    /// Read configuration from the process environment without caching.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let agent_image = var("AGENT_IMAGE").unwrap_or_else(|| DEFAULT_AGENT_IMAGE.to_string());
        let agent_container_name = var("AGENT_CONTAINER_NAME")
            .unwrap_or_else(|| DEFAULT_AGENT_CONTAINER_NAME.to_string());
        let agent_image_cache = var("AGENT_IMAGE_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_AGENT_IMAGE_CACHE));
        let agent_env = match var("AGENT_ENV_JSON") {
            Some(json) => env_vars_from_json(&json, "AGENT_ENV_JSON")?,
            None => Vec::new(),
        };
        let agent_binds =
            parse_binds(&var("AGENT_BINDS").unwrap_or_else(|| DEFAULT_AGENT_BINDS.to_string()))?;
        let stop_timeout_secs: u64 = parse_var(&var, "AGENT_STOP_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_STOP_TIMEOUT_SECS);
        let docker_host = var("DOCKER_HOST");
        let loopback_interface = var("LOOPBACK_INTERFACE")
            .unwrap_or_else(|| DEFAULT_LOOPBACK_INTERFACE.to_string());
        let proc_sys_root = var("PROC_SYS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/proc/sys"));
        let credentials_proxy_ip =
            parse_var(&var, "CREDENTIALS_PROXY_IP")?.unwrap_or(DEFAULT_CREDENTIALS_PROXY_IP);
        let credentials_proxy_port =
            parse_var(&var, "CREDENTIALS_PROXY_PORT")?.unwrap_or(DEFAULT_CREDENTIALS_PROXY_PORT);
        let agent_credentials_port =
            parse_var(&var, "AGENT_CREDENTIALS_PORT")?.unwrap_or(DEFAULT_AGENT_CREDENTIALS_PORT);

        // Docker takes the stop timeout as a signed integer.
        if i64::try_from(stop_timeout_secs).is_err() {
            return Err(SupervisorError::Config(format!(
                "invalid AGENT_STOP_TIMEOUT_SECS '{stop_timeout_secs}': exceeds {}",
                i64::MAX
            )));
        }

        if loopback_interface.contains('/') || loopback_interface.contains("..") {
            return Err(SupervisorError::Config(format!(
                "invalid LOOPBACK_INTERFACE '{loopback_interface}'"
            )));
        }

        Ok(SupervisorConfig {
            agent_image,
            agent_container_name,
            agent_image_cache,
            agent_env,
            agent_binds,
            stop_timeout: Duration::from_secs(stop_timeout_secs),
            docker_host,
            loopback_interface,
            proc_sys_root,
            credentials_proxy_ip,
            credentials_proxy_port,
            agent_credentials_port,
        })
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| SupervisorError::Config(format!("invalid {name} '{raw}': {err}"))),
        None => Ok(None),
    }
}
