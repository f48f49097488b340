//! Local gateway for the managed client.
//!
//! `rcgate run` takes over (or attaches to) the managed client, mirrors its
//! state and publishes every change to one downstream WebSocket consumer.
//! The other subcommands expose the process orchestrator directly.

mod config;
mod managers;
mod publish_server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::GatewayConfig;
use rcgate_cache::{ChangePublisher, ChangeSink, StateRegistry};
use rcgate_client::{ConnectError, ManagedClient, build_strategy};
use rcgate_process::{Entity, ProcessOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Local gateway for the managed client", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "RCGATE_CONFIG",
        value_name = "PATH",
        help = "Config file (defaults to <config dir>/rcgate/config.toml)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the managed client and serve the publish channel (default).
    Run,
    /// List the entities that can be managed on this OS.
    Entities,
    /// Kill every running instance of an entity.
    Kill {
        #[arg(help = "valorant, bacon or league_of_legends")]
        entity: Entity,
    },
    /// Kill the managed client's UX process.
    KillClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref()).context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.logging.filter.parse()?))
        .init();

    let processes = Arc::new(ProcessOrchestrator::new(config.process.clone()));
    tracing::debug!(os = ?processes.os(), "process orchestrator ready");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, processes).await,
        Command::Entities => {
            for entity in processes.supported_entities() {
                println!("{entity}");
            }
            Ok(())
        }
        Command::Kill { entity } => {
            let killed = processes.kill_entity_process(entity).await?;
            println!("killed {killed} {entity} process(es)");
            Ok(())
        }
        Command::KillClient => {
            processes.kill_client_ux().await?;
            println!("client UX stopped");
            Ok(())
        }
    }
}

async fn run(config: GatewayConfig, processes: Arc<ProcessOrchestrator>) -> anyhow::Result<()> {
    let strategy = build_strategy(&config.strategy, processes.clone())?;
    let client = ManagedClient::new(config.client.clone(), strategy)?;

    let publisher = ChangePublisher::spawn(config.publisher.queue.clone());
    let registry = Arc::new(StateRegistry::new());
    let sink: Arc<dyn ChangeSink> = publisher.clone();
    for manager in managers::publishing_managers(&client, sink)? {
        registry.register(manager);
    }
    client.add_listener(registry.clone());

    let listener = TcpListener::bind(config.publisher.listen)
        .await
        .with_context(|| format!("binding {}", config.publisher.listen))?;
    let server = tokio::spawn(publish_server::serve(listener, publisher.clone()));

    tracing::info!(strategy = ?config.strategy.kind, "Connecting to the managed client");
    let outcome = tokio::select! {
        result = client.connect() => match result {
            Ok(()) => {
                tracing::info!(managers = ?registry.ids(), "Gateway running");
                shutdown_signal().await;
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("connecting to the managed client")),
        },
        _ = shutdown_signal() => Ok(()),
    };

    server.abort();
    match client.disconnect().await {
        Ok(()) | Err(ConnectError::Conflict(_)) => {}
        Err(e) => tracing::warn!("disconnect failed: {e}"),
    }
    registry.shutdown();
    client.shutdown(config.publisher.queue.shutdown_grace()).await;
    publisher.shutdown().await;
    processes.shutdown().await;
    tracing::info!("Gateway stopped");

    outcome
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
