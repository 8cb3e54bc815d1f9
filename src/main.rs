use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use room_sync::cli::Args;
use room_sync::{ReconnectPolicy, RoomSession, SessionStatus, SharedEditor, SharedTranscript};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_sync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.session_config()?;

    let mut session = RoomSession::new(config.clone())?.with_policy(ReconnectPolicy {
        max_attempts: args.max_retries,
        ..ReconnectPolicy::default()
    });

    eprintln!(
        "{} {} {}",
        "joining room".bright_blue(),
        config.room_id.bright_white().bold(),
        format!("as @{} ({})", config.username, config.channel).dimmed()
    );

    session.connect().await?;

    if let Some(path) = &args.watch {
        if let Some(editor) = session.editor() {
            tokio::spawn(watch_file(path.clone(), editor));
        }
    }

    let transcript = session.transcript();
    tokio::spawn(print_transcript(transcript));

    let mut status_rx = session.watch_status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(text) => {
                        session.input_mut().set(&text);
                        if let Err(err) = session.send_message() {
                            eprintln!("{} {}", "send failed:".red(), err);
                        }
                    }
                    None => break, // stdin closed
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                match *status_rx.borrow() {
                    SessionStatus::Reconnecting { attempt } => {
                        eprintln!("{}", format!("reconnecting (attempt {})...", attempt).yellow());
                    }
                    SessionStatus::Disconnected => {
                        eprintln!("{}", "disconnected".red().bold());
                        return Ok(());
                    }
                    SessionStatus::Open => {
                        eprintln!("{}", "connected".green());
                    }
                    SessionStatus::Connecting => {}
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}

/// Print transcript entries as they arrive.
async fn print_transcript(transcript: SharedTranscript) {
    let mut printed = 0;
    let mut tick = tokio::time::interval(Duration::from_millis(150));
    loop {
        tick.tick().await;
        let entries: Vec<_> = match transcript.lock() {
            Ok(guard) => guard.entries()[printed..].to_vec(),
            Err(_) => continue,
        };
        for entry in entries {
            println!(
                "{} {}  {}",
                format!("@{}", entry.username).bright_cyan().bold(),
                entry.timestamp_label.dimmed(),
                entry.body
            );
            printed += 1;
        }
    }
}

/// Mirror a local file into the editor buffer, both directions.
///
/// A file edit becomes an editor change (which the session forwards as a
/// full-snapshot code change); a remote change lands in the editor and is
/// written back to the file. The content equality checks on both paths are
/// what keeps the file poll and the remote echo from chasing each other.
async fn watch_file(path: PathBuf, editor: SharedEditor) {
    let mut change_rx = match editor.lock() {
        Ok(guard) => guard.subscribe(),
        Err(_) => return,
    };
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let Ok(on_disk) = tokio::fs::read_to_string(&path).await else {
                    continue;
                };
                let differs = editor
                    .lock()
                    .map(|guard| guard.get_value() != on_disk)
                    .unwrap_or(false);
                if differs {
                    if let Ok(mut guard) = editor.lock() {
                        guard.set_value(&on_disk);
                    }
                }
            }
            event = change_rx.recv() => {
                match event {
                    Ok(snapshot) => {
                        let on_disk = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                        if on_disk != snapshot {
                            if let Err(err) = tokio::fs::write(&path, &snapshot).await {
                                tracing::warn!(error = %err, "failed to write watched file");
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}
