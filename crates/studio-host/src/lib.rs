//! Command-line host for the production studio.
//!
//! Reads JSON commands from stdin, applies them to a studio backed by the
//! headless engine and writes replies and events to stdout, one JSON object
//! per line.

pub mod commands;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::Context as _;
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studio_engine::{create_headless_studio, CommandLoop, CommandReply, RenderEngine, StudioOptions};
use studio_ipc::{Settings, StudioCommand, StudioEvent, COMMAND_CHANNEL_CAPACITY};

/// Host configuration resolved from the command line.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Settings to start the studio with before reading commands.
    pub settings: Option<Settings>,

    /// Orchestration options.
    pub options: StudioOptions,

    /// Directory screenshots are written to.
    pub screenshot_dir: PathBuf,
}

/// Initialize logging. Logs go to stderr; stdout carries the protocol.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "studio_host=debug,studio_engine=debug,studio_audio=info,studio_output=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Run the host until stdin closes or a `shutdown` command is handled.
pub fn run(config: HostConfig) -> anyhow::Result<()> {
    info!("Studio host starting");

    let (studio, engine, events) = create_headless_studio(config.options.clone());
    info!(engine = engine.name(), "Engine ready");
    let command_loop = CommandLoop::new(studio).context("failed to create command loop")?;

    let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY);
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded();

    if let Some(settings) = config.settings {
        command_tx
            .send(StudioCommand::Startup { settings })
            .context("failed to queue startup")?;
    }

    let event_thread = thread::Builder::new()
        .name("host-events".to_string())
        .spawn(move || write_events(events))
        .context("failed to spawn event writer")?;

    let screenshot_dir = config.screenshot_dir;
    let reply_thread = thread::Builder::new()
        .name("host-replies".to_string())
        .spawn(move || write_replies(reply_rx, screenshot_dir))
        .context("failed to spawn reply writer")?;

    // Not joined: a blocked stdin read ends with the process.
    thread::Builder::new()
        .name("host-stdin".to_string())
        .spawn(move || read_commands(command_tx))
        .context("failed to spawn stdin reader")?;

    command_loop.run(command_rx, reply_tx);
    drop(command_loop);

    if event_thread.join().is_err() {
        error!("Event writer panicked");
    }
    if reply_thread.join().is_err() {
        error!("Reply writer panicked");
    }

    info!("Studio host stopped");
    Ok(())
}

fn read_commands(command_tx: Sender<StudioCommand>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        match commands::parse_command(&line) {
            Ok(Some(command)) => {
                if command_tx.send(command).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Rejected input: {:#}", e);
                emit(&commands::error_line(&e));
            }
        }
    }
    info!("Stdin closed");
}

fn write_replies(replies: Receiver<CommandReply>, screenshot_dir: PathBuf) {
    for reply in replies.iter() {
        match commands::reply_line(&reply, &screenshot_dir) {
            Ok(line) => emit(&line),
            Err(e) => {
                error!("Failed to write reply: {:#}", e);
                emit(&commands::error_line(&e));
            }
        }
    }
}

fn write_events(events: Receiver<StudioEvent>) {
    for event in events.iter() {
        match commands::event_line(&event) {
            Ok(line) => emit(&line),
            Err(e) => error!("Failed to encode event: {:#}", e),
        }
    }
}

fn emit(line: &str) {
    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
        warn!("Failed to write stdout: {}", e);
    }
}
