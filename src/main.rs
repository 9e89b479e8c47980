mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use voicetriage_core::adapters::capture::ConsoleCapture;
use voicetriage_core::conversation::{
    Author, ConversationConfig, ConversationEvent, ConversationHandle, ConversationOrchestrator,
    ConversationState, Message,
};
use voicetriage_core::dirs_compat;
use voicetriage_core::telemetry::{init_tracing, init_tracing_with_file};

use crate::cli::Cli;

fn load_config(explicit: Option<PathBuf>) -> Result<ConversationConfig> {
    if let Some(path) = explicit {
        return ConversationConfig::from_path(&path);
    }
    match dirs_compat::config_dir().map(|dir| dir.join("config.json")) {
        Some(path) if path.exists() => ConversationConfig::from_path(&path),
        _ => Ok(ConversationConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = match dirs_compat::state_dir() {
        Some(dir) => Some(init_tracing_with_file(&dir.join("logs"))?),
        None => {
            init_tracing()?;
            None
        }
    };

    let config = load_config(cli.config).context("failed to load configuration")?;

    // Text mode reads stdin itself; capture then has no input and reports
    // itself unavailable if ever started.
    let capture = if cli.text {
        let (_closed_tx, closed_rx) = mpsc::channel(1);
        ConsoleCapture::with_source(closed_rx, tokio::spawn(async {}))
    } else {
        ConsoleCapture::from_stdin()
    };

    let orchestrator = ConversationOrchestrator::new(config, Arc::new(capture))?;
    let (handle, events) = orchestrator.start_session();
    let printer = tokio::spawn(print_events(events));

    let session = async {
        if cli.text {
            run_text(&handle).await
        } else {
            run_voice(&handle).await
        }
    };

    tokio::select! {
        result = session => {
            if let Err(err) = result {
                warn!(target: "voicetriage", %err, "session ended with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target: "voicetriage", "interrupt received, shutting down");
        }
    }

    handle.shutdown().await;
    printer.abort();
    Ok(())
}

/// Re-arms listening whenever a turn ends in idle until triage completes.
async fn run_voice(handle: &ConversationHandle) -> Result<()> {
    let mut events = handle.subscribe();
    println!("Listening. Type what you would say and press enter.");
    if !arm_listening(handle).await? {
        return Ok(());
    }

    loop {
        match events.recv().await {
            Ok(ConversationEvent::StateChanged(ConversationState::Idle)) => {
                let snapshot = handle.snapshot().await?;
                if snapshot.triage_complete {
                    return Ok(());
                }
                if !arm_listening(handle).await? {
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: "voicetriage", skipped, "event listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn arm_listening(handle: &ConversationHandle) -> Result<bool> {
    handle.start_listening().await?;
    if handle.snapshot().await?.state == ConversationState::Idle {
        println!("Speech capture is unavailable. Run with --text to type instead.");
        return Ok(false);
    }
    Ok(true)
}

async fn run_text(handle: &ConversationHandle) -> Result<()> {
    let mut events = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Describe your symptoms. An empty line or end of input quits.");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            break;
        }
        handle.submit_text(line).await?;
        wait_for_idle(&mut events).await?;
        if handle.snapshot().await?.triage_complete {
            break;
        }
    }
    Ok(())
}

async fn wait_for_idle(events: &mut broadcast::Receiver<ConversationEvent>) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(ConversationEvent::StateChanged(ConversationState::Idle)) => return Ok(()),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                anyhow::bail!("conversation ended unexpectedly")
            }
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<ConversationEvent>) {
    loop {
        match events.recv().await {
            Ok(ConversationEvent::MessageUpserted(message)) => print_message(&message),
            Ok(ConversationEvent::TriageCompleted) => println!("-- triage complete --"),
            Ok(ConversationEvent::StateChanged(state)) => {
                info!(target: "voicetriage", state = state.as_str(), "state changed");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_message(message: &Message) {
    if message.is_partial {
        return;
    }
    let speaker = match message.author {
        Author::User => "you",
        Author::Assistant if message.is_error => "notice",
        Author::Assistant => "nurse",
    };
    println!("{speaker}> {}", message.content);
}
