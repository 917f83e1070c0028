//! Service-manager entry point for the agent supervisor.
//!
//! Each lifecycle phase is a separate invocation, e.g. from systemd:
//! `ExecStartPre=agent-supervisor pre-start`, `ExecStart=agent-supervisor start`.

use std::process::ExitCode;

use agent_supervisor::{Engine, SupervisorConfig, SupervisorError};
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// Status returned when the agent asked not to be restarted.
const TERMINAL_EXIT_STATUS: u8 = 5;

#[derive(Parser, Debug)]
#[command(name = "agent-supervisor", version, about = "Supervise the agent container")]
struct Cli {
    #[command(subcommand)]
    phase: Phase,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Prepare host networking and make sure the agent image is available.
    PreStart,
    /// Run the agent, restarting it until it exits with a terminal code.
    Start,
    /// Stop the running agent container.
    PreStop,
    /// Undo the host network changes made by pre-start.
    PostStop,
    /// Reload the agent image from the on-disk cache.
    ReloadCache,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_log();

    match run(cli.phase).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:?} failed: {err}", cli.phase);
            ExitCode::from(exit_status(&err))
        }
    }
}

async fn run(phase: Phase) -> Result<(), SupervisorError> {
    let config = SupervisorConfig::load()?;
    let engine = Engine::new(config).await?;
    info!("agent-supervisor {phase:?} (image {})", config.agent_image);

    match phase {
        Phase::PreStart => engine.pre_start().await,
        Phase::Start => engine.start_supervised().await,
        Phase::PreStop => engine.pre_stop().await,
        Phase::PostStop => engine.post_stop().await,
        Phase::ReloadCache => engine.reload_cache().await,
    }
}

fn exit_status(err: &SupervisorError) -> u8 {
    if err.is_terminal_exit() {
        TERMINAL_EXIT_STATUS
    } else {
        1
    }
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_err()
    {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_every_phase() {
        for (arg, phase) in [
            ("pre-start", Phase::PreStart),
            ("start", Phase::Start),
            ("pre-stop", Phase::PreStop),
            ("post-stop", Phase::PostStop),
            ("reload-cache", Phase::ReloadCache),
        ] {
            let cli = Cli::try_parse_from(["agent-supervisor", arg]).unwrap();
            assert_eq!(cli.phase, phase);
        }
    }

    #[test]
    fn rejects_unknown_phase() {
        assert!(Cli::try_parse_from(["agent-supervisor", "restart"]).is_err());
        assert!(Cli::try_parse_from(["agent-supervisor"]).is_err());
    }

    #[test]
    fn terminal_exit_maps_to_distinct_status() {
        assert_eq!(exit_status(&SupervisorError::TerminalExit), 5);
        assert_eq!(
            exit_status(&SupervisorError::Docker("daemon down".into())),
            1
        );
    }
}
