use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use media_overlay::{Command, Config, Overlay};

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting media overlay");

    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    log::info!("Media-info endpoint: {}", config.endpoint());

    let (command_tx, command_rx) = unbounded_channel();

    // Ctrl+C asks the dispatch loop to shut down so the socket closes cleanly
    let quit_tx = command_tx.clone();
    ctrlc::set_handler(move || {
        log::info!("Received interrupt signal (Ctrl+C), shutting down...");
        let _ = quit_tx.send(Command::Quit);
    })
    .context("Failed to set Ctrl+C handler")?;

    spawn_stdin_reader(command_tx);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(async {
        let mut overlay = Overlay::with_websocket(&config)?;
        overlay.run(command_rx).await
    });

    runtime.shutdown_timeout(Duration::from_millis(500));
    log::info!("Media overlay stopped");
    result
}

/// Read user commands from stdin, one per line
fn spawn_stdin_reader(commands: UnboundedSender<Command>) {
    thread::spawn(move || {
        let reader = BufReader::new(std::io::stdin());

        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Command::parse(&line) {
                        Some(command) => {
                            if commands.send(command).is_err() {
                                break;
                            }
                        }
                        None => log::warn!("Unknown command: {} (try 'reconnect', 'width <px>' or 'quit')", line.trim()),
                    }
                }
                Err(e) => {
                    log::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }

        log::debug!("Stdin reader stopped");
    });
}
