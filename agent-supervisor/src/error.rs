/// Errors returned by supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Docker/container runtime failure.
    #[error("docker error: {0}")]
    Docker(String),
    /// Host network configuration failure.
    #[error("network error: {0}")]
    Network(String),
    /// An external command exited unsuccessfully.
    #[error("command error: {0}")]
    Command(String),
    /// Invalid input or configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// A lifecycle step failed. `message` names the step, `source` is the
    /// collaborator failure that caused it.
    #[error("{message}: {source}")]
    Engine {
        message: &'static str,
        #[source]
        source: Box<SupervisorError>,
    },
    /// The agent asked not to be restarted.
    #[error("agent exited with terminal exit code")]
    TerminalExit,
}

impl SupervisorError {
    /// Wrap `cause` with a phase-specific message.
    pub fn engine(message: &'static str, cause: SupervisorError) -> Self {
        SupervisorError::Engine {
            message,
            source: Box::new(cause),
        }
    }

    pub fn is_terminal_exit(&self) -> bool {
        matches!(self, SupervisorError::TerminalExit)
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn engine_error_display_joins_message_and_cause() {
        let err = SupervisorError::engine(
            "could not start Agent",
            SupervisorError::Docker("no such image".into()),
        );
        assert_eq!(
            err.to_string(),
            "could not start Agent: docker error: no such image"
        );
    }

    #[test]
    fn engine_error_keeps_cause_as_source() {
        let err = SupervisorError::engine(
            "could not enable loopback routing",
            SupervisorError::Network("permission denied".into()),
        );
        let source = err.source().expect("cause should be preserved");
        assert_eq!(source.to_string(), "network error: permission denied");
    }

    #[test]
    fn terminal_exit_is_distinguished() {
        assert!(SupervisorError::TerminalExit.is_terminal_exit());
        assert!(!SupervisorError::Docker("x".into()).is_terminal_exit());
        assert_eq!(
            SupervisorError::TerminalExit.to_string(),
            "agent exited with terminal exit code"
        );
    }
}
