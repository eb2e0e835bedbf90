//! Sitecluster Command-Line Interface
//!
//! Scheduler-neutral job control for workflow engines. Stdout carries only
//! command results; logs and errors go to stderr.
//!
//! ```text
//! sitecluster api
//! sitecluster queues
//! sitecluster submit --queue batch --jobname sim -- ./simulate.sh input.dat
//! sitecluster status -e 12345.mgr001
//! sitecluster kill 12345.mgr001 12346.mgr001
//! sitecluster nodecount
//! sitecluster startnode 1 hostname
//! sitecluster behavior
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{api, behavior, kill, nodes, queues, status, submit};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Api => {
            api::execute();
            Ok(())
        }

        Commands::Queues => queues::execute().await,

        Commands::Submit(args) => submit::execute(&args).await,

        Commands::Status {
            add_exit_status,
            job_id,
        } => status::execute(&job_id, add_exit_status).await,

        Commands::Kill { job_ids } => kill::execute(&job_ids).await,

        Commands::NodeCount => nodes::execute_count().await,

        Commands::StartNode { node, command } => nodes::execute_start(node, &command).await,

        Commands::Behavior => behavior::execute(),
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
