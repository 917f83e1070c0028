//! Docker-backed [`AgentRuntime`].

use std::path::Path;

use bytes::Bytes;
use docktopus::DockerBuilder;
use docktopus::bollard::container::{
    Config as BollardConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use docktopus::bollard::errors::Error as BollardError;
use docktopus::bollard::image::ImportImageOptions;
use docktopus::bollard::models::{ContainerWaitResponse, HostConfig};
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::agent::AgentRuntime;
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};

/// Runs the agent as a single named container on the local Docker engine.
pub struct DockerAgentClient {
    builder: DockerBuilder,
    config: SupervisorConfig,
}

/// Where `check_and_load_image` takes the agent image from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ImageSource {
    /// Already in the local image store.
    Present,
    /// Imported from the cached tarball.
    Cache,
    /// Pulled from the registry.
    Registry,
}

impl DockerAgentClient {
    /// Connect to Docker at `DOCKER_HOST`, or the local socket when unset.
    pub async fn connect(config: SupervisorConfig) -> Result<Self> {
        let builder = match config.docker_host.as_deref() {
            Some(host) => DockerBuilder::with_address(host).await.map_err(|err| {
                SupervisorError::Docker(format!("Failed to connect to docker at {host}: {err}"))
            })?,
            None => DockerBuilder::new().await.map_err(|err| {
                SupervisorError::Docker(format!("Failed to connect to docker: {err}"))
            })?,
        };
        Ok(Self { builder, config })
    }

    async fn image_present(&self) -> Result<bool> {
        match self
            .builder
            .client()
            .inspect_image(&self.config.agent_image)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_status(&err, 404) => Ok(false),
            Err(err) => Err(SupervisorError::Docker(format!(
                "Failed to inspect image {}: {err}",
                self.config.agent_image
            ))),
        }
    }

    async fn import_cache(&self) -> Result<()> {
        let path = &self.config.agent_image_cache;
        let tarball = tokio::fs::read(path).await.map_err(|err| {
            SupervisorError::Docker(format!(
                "Failed to read image cache {}: {err}",
                path.display()
            ))
        })?;

        let client = self.builder.client();
        let mut stream = Box::pin(client.import_image(
            ImportImageOptions { quiet: true },
            Bytes::from(tarball),
            None,
        ));
        while let Some(result) = stream.next().await {
            let info = result.map_err(|err| {
                SupervisorError::Docker(format!("Failed to load image cache: {err}"))
            })?;
            if let Some(error) = info.error {
                return Err(SupervisorError::Docker(format!(
                    "Failed to load image cache: {error}"
                )));
            }
        }
        info!("Loaded agent image from {}", path.display());
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        let image = &self.config.agent_image;
        info!("Pulling agent image {image}");
        self.builder
            .pull_image(image, None)
            .await
            .map_err(|err| SupervisorError::Docker(format!("Failed to pull image {image}: {err}")))
    }
}

#[async_trait::async_trait]
impl AgentRuntime for DockerAgentClient {
    async fn check_and_load_image(&self) -> Result<()> {
        let present = self.image_present().await?;
        match image_source(present, &self.config.agent_image_cache).await? {
            ImageSource::Present => {
                debug!("Agent image {} already present", self.config.agent_image);
                Ok(())
            }
            ImageSource::Cache => self.import_cache().await,
            ImageSource::Registry => self.pull().await,
        }
    }

    async fn remove_existing_agent_container(&self) -> Result<()> {
        let name = &self.config.agent_container_name;
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        let result = self
            .builder
            .client()
            .remove_container(name, Some(options))
            .await;
        remove_outcome(name, result)
    }

    async fn start_agent(&self) -> Result<i64> {
        let client = self.builder.client();

        let response = client
            .create_container(
                Some(create_options(&self.config)),
                container_config(&self.config),
            )
            .await
            .map_err(|err| SupervisorError::Docker(format!("Failed to create container: {err}")))?;

        client
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| SupervisorError::Docker(format!("Failed to start container: {err}")))?;
        debug!(
            "Agent container {} started ({})",
            self.config.agent_container_name, response.id
        );

        let mut wait = Box::pin(
            client.wait_container(&response.id, None::<WaitContainerOptions<String>>),
        );
        exit_code_from_wait(wait.next().await)
    }

    async fn stop_agent(&self) -> Result<()> {
        let name = &self.config.agent_container_name;
        let result = self
            .builder
            .client()
            .stop_container(name, Some(stop_options(&self.config)?))
            .await;
        stop_outcome(name, result)
    }

    async fn download_agent_image(&self) -> Result<()> {
        self.pull().await
    }

    async fn load_cached_image(&self) -> Result<()> {
        self.import_cache().await
    }
}

fn create_options(config: &SupervisorConfig) -> CreateContainerOptions<String> {
    CreateContainerOptions {
        name: config.agent_container_name.clone(),
        platform: None,
    }
}

/// Host networking, so the agent's credentials listener is reachable on
/// 127.0.0.1 for the DNAT rule.
fn container_config(config: &SupervisorConfig) -> BollardConfig<String> {
    let host_config = HostConfig {
        binds: Some(config.agent_binds.clone()),
        network_mode: Some("host".to_string()),
        ..Default::default()
    };

    BollardConfig {
        image: Some(config.agent_image.clone()),
        env: Some(config.agent_env.clone()),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// The cache is only consulted when the image is missing. Failing to stat the
/// cache is an error rather than a silent fall-through to the registry.
async fn image_source(present: bool, cache: &Path) -> Result<ImageSource> {
    if present {
        return Ok(ImageSource::Present);
    }
    let cached = tokio::fs::try_exists(cache).await.map_err(|err| {
        SupervisorError::Docker(format!(
            "Failed to check image cache {}: {err}",
            cache.display()
        ))
    })?;
    Ok(if cached {
        ImageSource::Cache
    } else {
        ImageSource::Registry
    })
}

fn stop_options(config: &SupervisorConfig) -> Result<StopContainerOptions> {
    let secs = config.stop_timeout.as_secs();
    let t = i64::try_from(secs).map_err(|_| {
        SupervisorError::Config(format!("stop timeout {secs}s is out of range"))
    })?;
    Ok(StopContainerOptions { t })
}

fn remove_outcome(name: &str, result: std::result::Result<(), BollardError>) -> Result<()> {
    match result {
        Ok(()) => {
            debug!("Removed existing agent container {name}");
            Ok(())
        }
        Err(err) if is_status(&err, 404) => Ok(()),
        Err(err) => Err(SupervisorError::Docker(format!(
            "Failed to remove container {name}: {err}"
        ))),
    }
}

fn stop_outcome(name: &str, result: std::result::Result<(), BollardError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        // 304: already stopped, 404: never started.
        Err(err) if is_status(&err, 304) || is_status(&err, 404) => Ok(()),
        Err(err) => Err(SupervisorError::Docker(format!(
            "Failed to stop container {name}: {err}"
        ))),
    }
}

fn is_status(err: &BollardError, status: u16) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == status
    )
}

/// The engine reports non-zero exits as wait errors; those still carry the
/// container's exit status.
fn exit_code_from_wait(
    event: Option<std::result::Result<ContainerWaitResponse, BollardError>>,
) -> Result<i64> {
    match event {
        Some(Ok(response)) => Ok(response.status_code),
        Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(err)) => Err(SupervisorError::Docker(format!(
            "Failed to wait for container: {err}"
        ))),
        None => Err(SupervisorError::Docker(
            "Container wait ended without an exit status".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server_error(status_code: u16) -> BollardError {
        BollardError::DockerResponseServerError {
            status_code,
            message: "No such container: ecs-agent".into(),
        }
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig::from_lookup(|name| match name {
            "AGENT_IMAGE" => Some("registry.local/agent:1.2".into()),
            "AGENT_CONTAINER_NAME" => Some("agent-under-test".into()),
            "AGENT_ENV_JSON" => Some(r#"{"ECS_CLUSTER":"prod"}"#.into()),
            "AGENT_BINDS" => Some("/var/log/ecs:/log,/etc/ecs:/etc/ecs:ro".into()),
            "AGENT_STOP_TIMEOUT_SECS" => Some("12".into()),
            _ => None,
        })
        .unwrap()
    }

    // ── container definition ─────────────────────────────────────────────

    #[test]
    fn create_options_use_configured_name() {
        let options = create_options(&test_config());
        assert_eq!(options.name, "agent-under-test");
        assert!(options.platform.is_none());
    }

    #[test]
    fn container_config_carries_image_env_and_binds_on_host_network() {
        let config = container_config(&test_config());
        assert_eq!(config.image.as_deref(), Some("registry.local/agent:1.2"));
        assert_eq!(config.env, Some(vec!["ECS_CLUSTER=prod".to_string()]));

        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("host"));
        assert_eq!(
            host.binds,
            Some(vec![
                "/var/log/ecs:/log".to_string(),
                "/etc/ecs:/etc/ecs:ro".to_string(),
            ])
        );
    }

    // ── image source ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn present_image_skips_the_cache() {
        // Would fail to stat, but is never looked at.
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ecs-agent.tar");
        std::fs::write(&file, b"tar").unwrap();
        let unreadable = file.join("nested");

        assert_eq!(
            image_source(true, &unreadable).await.unwrap(),
            ImageSource::Present
        );
    }

    #[tokio::test]
    async fn missing_image_with_cache_imports() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("ecs-agent.tar");
        std::fs::write(&cache, b"tar").unwrap();

        assert_eq!(image_source(false, &cache).await.unwrap(), ImageSource::Cache);
    }

    #[tokio::test]
    async fn missing_image_without_cache_pulls() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("ecs-agent.tar");

        assert_eq!(
            image_source(false, &cache).await.unwrap(),
            ImageSource::Registry
        );
    }

    #[tokio::test]
    async fn cache_stat_failure_is_reported_not_pulled() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ecs-agent.tar");
        std::fs::write(&file, b"tar").unwrap();
        // A regular file as a parent directory fails with ENOTDIR, even as root.
        let cache = file.join("nested.tar");

        let err = image_source(false, &cache).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Docker(_)));
        assert!(
            err.to_string().contains("Failed to check image cache"),
            "unexpected: {err}"
        );
    }

    // ── stop / remove ────────────────────────────────────────────────────

    #[test]
    fn stop_options_use_configured_timeout() {
        assert_eq!(stop_options(&test_config()).unwrap().t, 12);
    }

    #[test]
    fn stop_timeout_beyond_docker_range_is_rejected() {
        let mut config = test_config();
        config.stop_timeout = Duration::from_secs(u64::MAX);
        assert!(stop_options(&config).is_err());
    }

    #[test]
    fn stop_treats_not_modified_and_missing_as_stopped() {
        stop_outcome("ecs-agent", Ok(())).unwrap();
        stop_outcome("ecs-agent", Err(server_error(304))).unwrap();
        stop_outcome("ecs-agent", Err(server_error(404))).unwrap();

        let err = stop_outcome("ecs-agent", Err(server_error(500))).unwrap_err();
        assert!(err.to_string().contains("Failed to stop container ecs-agent"));
    }

    #[test]
    fn remove_treats_only_missing_as_removed() {
        remove_outcome("ecs-agent", Ok(())).unwrap();
        remove_outcome("ecs-agent", Err(server_error(404))).unwrap();
        assert!(remove_outcome("ecs-agent", Err(server_error(304))).is_err());
        assert!(remove_outcome("ecs-agent", Err(server_error(409))).is_err());
    }

    // ── wait ─────────────────────────────────────────────────────────────

    #[test]
    fn wait_response_yields_status_code() {
        let response = ContainerWaitResponse {
            status_code: 0,
            ..Default::default()
        };
        assert_eq!(exit_code_from_wait(Some(Ok(response))).unwrap(), 0);
    }

    #[test]
    fn wait_error_with_code_is_an_exit_not_a_failure() {
        let err = BollardError::DockerContainerWaitError {
            error: String::new(),
            code: 42,
        };
        assert_eq!(exit_code_from_wait(Some(Err(err))).unwrap(), 42);
    }

    #[test]
    fn server_error_during_wait_is_a_failure() {
        assert!(exit_code_from_wait(Some(Err(server_error(500)))).is_err());
    }

    #[test]
    fn empty_wait_stream_is_a_failure() {
        let err = exit_code_from_wait(None).unwrap_err();
        assert!(err.to_string().contains("without an exit status"));
    }

    #[test]
    fn status_matching() {
        let err = server_error(404);
        assert!(is_status(&err, 404));
        assert!(!is_status(&err, 304));
    }
}
