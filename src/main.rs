use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use keystone::config::{self, Settings};
use keystone::dispatch::Dispatcher;
use keystone::logging;
use keystone::server;
use keystone::tasks::{ProcessExecutor, TaskCategory, TaskRegistry};

#[derive(Parser)]
#[command(
    name = "keystone",
    version,
    about = "Runs registered tasks for a workflow orchestrator, gated by TOTP."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the task endpoints (default)
    Serve,
    /// Check settings and task files, list registered tasks, then exit
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.settings).await,
        Command::Validate => validate(&cli.settings),
    }
}

/// Everything that must succeed before a request is accepted.
fn prepare(settings: &Settings) -> Result<(keystone::auth::Authenticator, TaskRegistry)> {
    settings.validate()?;
    let authenticator = settings.authenticator();
    authenticator.check()?;
    let registry = TaskRegistry::load(&settings.registry_paths())?;
    Ok((authenticator, registry))
}

async fn serve(settings: Settings) -> Result<()> {
    logging::init(settings.log_dir.as_deref())?;

    let (authenticator, registry) = prepare(&settings)?;
    for category in TaskCategory::ALL {
        info!(%category, tasks = registry.names(category).len(), "task registry loaded");
    }

    let executor = Arc::new(ProcessExecutor::new(settings.executor_config()));
    let dispatcher = Arc::new(Dispatcher::new(
        authenticator,
        Arc::new(registry),
        executor,
    ));

    let addr = settings.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "keystone listening");

    axum::serve(
        listener,
        server::router(dispatcher).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await
    .context("server error")
}

fn validate(settings: &Settings) -> Result<()> {
    let (_, registry) = prepare(settings)?;

    for category in TaskCategory::ALL {
        let names = registry.names(category);
        println!("{category} ({})", names.len());
        for name in names {
            println!("  {name}");
        }
    }
    println!("\n✓ {} task(s) registered", registry.len());
    Ok(())
}
