mod commands;

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam::channel::{Receiver, unbounded};
use stems_core::{Config, Session, StemSet, TransportEvent};
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, HELP};

const POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "stems", about = "Play separated stems in sync")]
struct Cli {
    /// Stem files, or directories containing them
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Directory relative stem paths are resolved against
    #[arg(long)]
    stems_root: Option<PathBuf>,

    /// Write the effective settings to the config file and continue
    #[arg(long)]
    save_config: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load();
    if let Some(root) = cli.stems_root {
        config.stems_root = Some(root);
    }
    if cli.save_config {
        config.save();
    }

    let stems = StemSet::from_paths(&cli.paths).context("could not collect stems")?;
    println!(
        "loading {} stems: {}",
        stems.len(),
        stems.labels().collect::<Vec<_>>().join(", ")
    );

    let mut session = Session::open(stems, &config)?;
    let input = spawn_input_reader();
    println!("type 'help' for commands");

    'run: loop {
        for command in input.try_iter() {
            if command == Command::Quit {
                break 'run;
            }
            if let Err(e) = handle(&mut session, command) {
                eprintln!("{e}");
            }
        }

        for event in session.poll() {
            report(&event);
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    tracing::info!("Shutting down");
    Ok(())
}

/// Read stdin lines on a helper thread and forward parsed commands. End of
/// input quits.
fn spawn_input_reader() -> Receiver<Command> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        return;
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
        let _ = tx.send(Command::Quit);
    });
    rx
}

fn handle(session: &mut Session, command: Command) -> anyhow::Result<()> {
    if !session.is_ready() && needs_ready(&command) {
        let snapshot = session.snapshot();
        println!(
            "still loading ({}/{} ready)",
            snapshot.ready_count, snapshot.track_count
        );
        return Ok(());
    }

    match command {
        Command::Play => session.play(),
        Command::Pause => session.pause(),
        Command::Stop => session.stop(),
        Command::Mute(name) => session.toggle_mute(&name)?,
        Command::UnmuteAll => session.unmute_all(),
        Command::Solo(name) => session.solo(&name)?,
        Command::Volume(name, volume) => session.set_volume(&name, volume)?,
        Command::Marker => {
            session.add_marker()?;
        }
        Command::RemoveMarker(index) => session.remove_marker(index)?,
        Command::Jump(index) => session.jump_to_marker(index)?,
        Command::Seek(seconds) => session.seek(seconds),
        Command::Undo => {
            if !session.undo() {
                println!("nothing to undo");
            }
        }
        Command::Redo => {
            if !session.redo() {
                println!("nothing to redo");
            }
        }
        Command::Status => {}
        Command::Snapshot => {
            println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
            return Ok(());
        }
        Command::Help => {
            println!("{HELP}");
            return Ok(());
        }
        Command::Quit => return Ok(()),
    }

    println!("{}", session.snapshot().summary());
    Ok(())
}

fn needs_ready(command: &Command) -> bool {
    !matches!(
        command,
        Command::Status | Command::Snapshot | Command::Help | Command::Quit | Command::Volume(..)
    )
}

fn report(event: &TransportEvent) {
    match event {
        TransportEvent::EnsembleReady => println!("all stems ready"),
        TransportEvent::TrackFailed { track, reason } => {
            println!("{track} failed to load: {reason}");
        }
        TransportEvent::Seeked { source, time } => println!("{source} seeked to {time:.2}s"),
        TransportEvent::Finished => println!("finished"),
        TransportEvent::DriftCorrected(c) => {
            tracing::debug!(track = %c.track, from = c.from, to = c.to, "Drift corrected");
        }
    }
}
