use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use vigil::cli::{Cli, Commands};
use vigil::config::VigilConfig;
use vigil::daemon::{default_socket_path, Daemon, DaemonClient};
use vigil::event::{AgentEvent, AgentSummary, Command};
use vigil::orchestrator::Orchestrator;
use vigil::process::SystemLauncher;

/// How long client commands wait for their answer event.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("vigil=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket_path = match cli.socket {
        Some(path) => path,
        None => default_socket_path()?,
    };

    if let Commands::Serve = cli.command {
        return serve(socket_path).await;
    }

    let client = DaemonClient::new(socket_path);
    if let Commands::Events = cli.command {
        let mut stream = client.subscribe().await?;
        while let Some(event) = stream.next_event().await? {
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    let Some(command) = cli.command.to_command() else {
        return Ok(());
    };
    match command {
        Command::ListAgents => {
            let reply = client
                .request(&command, |event| matches!(event, AgentEvent::AgentList { .. }), REPLY_TIMEOUT)
                .await?;
            match reply {
                Some(AgentEvent::AgentList { agents }) => print_agents(&agents),
                _ => anyhow::bail!("No agent list from daemon"),
            }
        }
        Command::ResyncAgent { id } => {
            let reply = client
                .request(
                    &command,
                    |event| matches!(event, AgentEvent::ResyncResult { id: got, .. } if *got == id),
                    REPLY_TIMEOUT,
                )
                .await?;
            match reply {
                Some(AgentEvent::ResyncResult { ok: true, .. }) => println!("Agent {} resynced", id),
                Some(AgentEvent::ResyncResult { reason, .. }) => {
                    anyhow::bail!("Resync failed: {}", reason.unwrap_or_default())
                }
                _ => anyhow::bail!("No resync result from daemon"),
            }
        }
        command => client.send(&command).await?,
    }

    Ok(())
}

/// Run the orchestrator and socket server until Ctrl-C.
async fn serve(socket_path: std::path::PathBuf) -> Result<()> {
    let config = VigilConfig::from_env();
    let (orchestrator, rx) = Orchestrator::new(config, Box::new(SystemLauncher));
    let handle = orchestrator.handle();
    let event_loop = tokio::spawn(orchestrator.run(rx));

    let daemon = Daemon::new(socket_path, handle.clone());
    tokio::select! {
        result = daemon.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    handle.shutdown();
    event_loop.await?;
    Ok(())
}

fn print_agents(agents: &[AgentSummary]) {
    if agents.is_empty() {
        println!("No agents running.");
        return;
    }
    println!("{:<4} {:<8} {:<8} {:<40} TOOLS", "ID", "PROVIDER", "STATUS", "WORKDIR");
    for agent in agents {
        let marker = if agent.focused { "*" } else { " " };
        let status = match agent.status {
            vigil::agent::AgentStatus::Active => "active",
            vigil::agent::AgentStatus::Waiting => "waiting",
        };
        println!(
            "{:<3}{} {:<8} {:<8} {:<40} {}",
            agent.id.to_string(),
            marker,
            agent.provider.to_string(),
            status,
            agent.working_dir.display().to_string(),
            agent.active_tools.join(", ")
        );
    }
}
