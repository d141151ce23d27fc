//! lofn - serve serverless functions locally, in a TUI
//!
//! This is the binary entry point. All logic lives in the workspace crates.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::{mpsc, watch};

use lofn_app::message::Message;
use lofn_app::state::AppState;
use lofn_app::{config, session, signals};
use lofn_core::prelude::*;
use lofn_daemon::ToolAvailability;

/// lofn - serve serverless functions locally against a Pub/Sub emulator
#[derive(Parser, Debug)]
#[command(name = "lofn")]
#[command(
    about = "Serve serverless functions locally against a Pub/Sub emulator",
    long_about = None
)]
struct Args {
    /// Path to the project directory containing lofn.toml
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Mirror raw child output to stderr and run the emulator verbose
    #[arg(long)]
    debug: bool,

    /// Override the emulator data directory (must exist)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// First port assigned to function runtimes
    #[arg(long, value_name = "PORT")]
    base_port: Option<u16>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    lofn_core::logging::init()?;

    let project_dir = args
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    // Fail fast on missing host tools, before any terminal takeover.
    ToolAvailability::check().require()?;

    let mut harness_config = config::load(&project_dir)?;
    if let Some(data_dir) = args.data_dir {
        harness_config.emulator_data_dir = Some(data_dir);
    }
    if let Some(base_port) = args.base_port {
        harness_config.base_port = base_port;
    }
    info!(
        "Loaded config: project={}, {} function(s)",
        harness_config.project,
        harness_config.functions.len()
    );

    // Data directory validation happens here, before anything is spawned.
    let processes = session::build_processes(&harness_config, args.debug)?;

    let function_rows: Vec<(String, u16)> = processes
        .runners
        .iter()
        .map(|runner| (runner.name().to_string(), runner.port()))
        .collect();
    let mut state = AppState::new(
        &harness_config.project,
        processes.emulator.name(),
        &function_rows,
    );

    let (msg_tx, msg_rx) = mpsc::channel::<Message>(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Signal handler sends Quit on SIGINT/SIGTERM.
    signals::spawn_signal_handler(msg_tx.clone());

    // Subscribe the TEA loop to every feed before the session starts.
    session::spawn_all_forwarders(&processes, &msg_tx);

    let session_task = tokio::spawn(session::run_session(processes, msg_tx, shutdown_rx));

    let tui_result = lofn_tui::run(&mut state, msg_rx).await;

    // The loop has exited; stop the session and wait for teardown to free
    // ports, environment variables, and temp directories.
    let _ = shutdown_tx.send(true);
    let session_result = session_task.await;

    tui_result?;
    match session_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(join_error) => Err(color_eyre::eyre::eyre!("session task failed: {join_error}")),
    }
}
