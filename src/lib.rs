pub mod clock;
pub mod config;
pub mod db;
pub mod store;
pub mod summary;
pub mod timer;


use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use clock::SystemClock;
use config::TimerConfig;
use db::Database;
use store::SessionStore;
use timer::{
    commands::{describe_state, run_command, HostCommand},
    TimerController, TimerStatus,
};

const DATA_DIR_ENV: &str = "WORKTIMER_DATA_DIR";
const OWNER_ENV: &str = "WORKTIMER_OWNER";

fn data_dir() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".worktimer"))
}

/// Console host: plays the UI role, forwarding stdin commands to the timer
/// and printing status transitions.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("worktimer starting up...");

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run_host())
}

async fn run_host() -> Result<()> {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let config = TimerConfig::load(&data_dir.join("timer.json"))?;
    let database = Database::new(data_dir.join("worktimer.sqlite3"))?;
    let store: Arc<dyn SessionStore> = Arc::new(database);
    let controller = TimerController::new(store.clone(), Arc::new(SystemClock), config);

    let mut updates = controller.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last_status = updates.borrow().status;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.status == last_status {
                continue;
            }
            last_status = state.status;
            match state.status {
                TimerStatus::Aborted => println!("! session aborted: {}", describe_state(&state)),
                TimerStatus::Completed => println!("* session completed: {}", describe_state(&state)),
                _ => {}
            }
        }
    });

    if let Ok(owner) = std::env::var(OWNER_ENV) {
        if !owner.trim().is_empty() {
            controller.set_owner(Some(owner.trim().to_string())).await;
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match HostCommand::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                warn!("{err}");
                continue;
            }
        };

        match run_command(&controller, store.as_ref(), command).await {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => break,
            Err(err) => error!("{err:#}"),
        }
    }

    // An open session stays open; the next launch reconciles it.
    controller.shutdown().await;
    watcher.abort();
    info!("worktimer shutting down");
    Ok(())
}
