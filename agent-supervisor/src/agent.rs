//! Agent runtime contract and the exit-code protocol between the agent and
//! its supervisor.

use crate::error::Result;

/// Exit code meaning the agent finished and should not be restarted.
pub const TERMINAL_SUCCESS_EXIT_CODE: i64 = 0;
/// Exit code meaning the agent hit an unrecoverable condition.
pub const TERMINAL_FAILURE_EXIT_CODE: i64 = 5;
/// Exit code asking the supervisor to pull a newer image before restarting.
pub const UPGRADE_EXIT_CODE: i64 = 42;

/// Interpretation of one agent container exit status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentExitCode {
    Success,
    Failure,
    Upgrade,
    /// Crashes, signals and anything else: restart without special action.
    Other(i64),
}

impl AgentExitCode {
    /// Only `Success` and `Failure` end supervision.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentExitCode::Success | AgentExitCode::Failure)
    }

    pub fn code(self) -> i64 {
        match self {
            AgentExitCode::Success => TERMINAL_SUCCESS_EXIT_CODE,
            AgentExitCode::Failure => TERMINAL_FAILURE_EXIT_CODE,
            AgentExitCode::Upgrade => UPGRADE_EXIT_CODE,
            AgentExitCode::Other(code) => code,
        }
    }
}

impl From<i64> for AgentExitCode {
    fn from(code: i64) -> Self {
        match code {
            TERMINAL_SUCCESS_EXIT_CODE => AgentExitCode::Success,
            TERMINAL_FAILURE_EXIT_CODE => AgentExitCode::Failure,
            UPGRADE_EXIT_CODE => AgentExitCode::Upgrade,
            other => AgentExitCode::Other(other),
        }
    }
}

impl std::fmt::Display for AgentExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Lifecycle operations on the single container running the agent.
///
/// Implementations own the details of reaching the container engine; the
/// engine only sequences these calls.
#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Make sure the agent image is present locally, loading or pulling it
    /// only when it is missing.
    async fn check_and_load_image(&self) -> Result<()>;

    /// Remove a leftover agent container. A missing container is success.
    async fn remove_existing_agent_container(&self) -> Result<()>;

    /// Start a new agent container and wait for it to exit, returning the
    /// container's exit status.
    async fn start_agent(&self) -> Result<i64>;

    /// Stop the running agent container.
    async fn stop_agent(&self) -> Result<()>;

    /// Pull the latest agent image.
    async fn download_agent_image(&self) -> Result<()>;

    /// Load the agent image from the on-disk cache, replacing any local copy.
    async fn load_cached_image(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_codes_map_to_variants() {
        assert_eq!(AgentExitCode::from(0), AgentExitCode::Success);
        assert_eq!(AgentExitCode::from(5), AgentExitCode::Failure);
        assert_eq!(AgentExitCode::from(42), AgentExitCode::Upgrade);
        assert_eq!(AgentExitCode::from(-1), AgentExitCode::Other(-1));
        assert_eq!(AgentExitCode::from(137), AgentExitCode::Other(137));
    }

    #[test]
    fn only_success_and_failure_are_terminal() {
        assert!(AgentExitCode::Success.is_terminal());
        assert!(AgentExitCode::Failure.is_terminal());
        assert!(!AgentExitCode::Upgrade.is_terminal());
        for code in [-1, 1, 2, 7, 41, 43, 137, 143] {
            assert!(!AgentExitCode::from(code).is_terminal(), "code {code}");
        }
    }

    #[test]
    fn code_is_preserved() {
        for code in [-1, 0, 5, 42, 255] {
            assert_eq!(AgentExitCode::from(code).code(), code);
        }
        assert_eq!(AgentExitCode::Other(9).to_string(), "9");
    }
}
