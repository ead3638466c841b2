//! cobalt - record and replay mouse sessions
//!
//! Thin control surface over the cobalt-recorder engine.
//!
//! Capture: macOS, Windows. Playback: macOS, Windows, Linux (X11).

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use cobalt_recorder::prelude::*;

#[derive(Parser)]
#[command(name = "cobalt")]
#[command(about = "Cobalt - record and replay mouse sessions")]
#[command(version)]
struct Cli {
    /// Directory holding recordings and the catalog [default: current directory]
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record mouse input until the stop button is pressed
    Record {
        #[arg(short, long, value_parser = parse_name)]
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Pressing this button ends the recording (left, right, middle)
        #[arg(long, default_value = "right")]
        stop_button: ButtonId,
        /// Ignore moves shorter than this many pixels
        #[arg(long, default_value = "0")]
        min_distance: f64,
    },
    /// Replay a recording
    Replay {
        file: String,
        #[arg(short, long, default_value = "1.0")]
        speed: f64,
        /// Seconds to wait before the pointer is moved
        #[arg(long, default_value = "2")]
        delay: f64,
        /// Log actions instead of moving the pointer
        #[arg(long)]
        dry_run: bool,
    },
    /// List catalogued recordings
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show recording info
    Show {
        file: String,
        #[arg(long)]
        all: bool,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

fn parse_name(s: &str) -> std::result::Result<String, String> {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(s.to_string())
    } else {
        Err("name must be letters, digits or underscores".to_string())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        if let Some(err) = e.downcast_ref::<Error>() {
            let _ = print_json(&Output::<()>::err(err.clone()));
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = match cli.dir {
        Some(dir) => SessionStore::with_dir(dir)?,
        None => SessionStore::new()?,
    };

    match cli.command {
        Commands::Record { name, description, stop_button, min_distance } => {
            record(store, &name, &description, stop_button, min_distance)
        }
        Commands::Replay { file, speed, delay, dry_run } => {
            replay(store, &file, speed, delay, dry_run)
        }
        Commands::List { json } => list(store, json),
        Commands::Show { file, all } => show(store, &file, all),
    }
}

fn record(
    store: SessionStore,
    name: &str,
    description: &str,
    stop_button: ButtonId,
    min_distance: f64,
) -> Result<()> {
    let capture = CaptureConfig::default()
        .stop_button(stop_button)
        .min_move_distance(min_distance);
    let engine = Arc::new(Engine::new(
        NativeBackend::new(),
        store,
        EngineConfig::default().capture(capture),
    ));
    let notifications = engine.notifications();

    engine.begin_capture(name, description)?;
    println!("Recording: {} (press {} button or Ctrl+C to stop)", name, stop_button);

    let e = Arc::clone(&engine);
    ctrlc::set_handler(move || {
        let _ = e.stop_capture();
    })?;

    match notifications.recv()? {
        Notification::RecordingComplete(recording) => {
            println!("{} events recorded", recording.events.len());
            let file = engine.persist(&recording)?;
            println!("Saved: {}", engine.store().path().join(&file).display());
            Ok(())
        }
        Notification::CaptureFailed { error, .. } => Err(error.into()),
        other => anyhow::bail!("unexpected notification: {:?}", other),
    }
}

fn replay(store: SessionStore, file: &str, speed: f64, delay: f64, dry_run: bool) -> Result<()> {
    let lead_in = Duration::try_from_secs_f64(delay).map_err(|_| {
        Error::invalid_config(format!(
            "Delay must be a non-negative number of seconds, got {}",
            delay
        ))
    })?;
    let config = EngineConfig::default().replay(ReplayConfig { speed, lead_in });
    let engine = Arc::new(if dry_run {
        Engine::new(DryRunBackend, store, config)
    } else {
        Engine::new(NativeBackend::new(), store, config)
    });

    let recording = engine.load(file)?;
    println!(
        "Replaying {} ({} events, {:.1}s) at {}x speed...",
        recording.name,
        recording.events.len(),
        recording.span().as_secs_f64(),
        speed
    );
    if delay > 0.0 {
        println!("Starting in {} seconds...", delay);
    }

    let handle = engine.begin_playback(recording)?;
    let e = Arc::clone(&engine);
    ctrlc::set_handler(move || {
        let _ = e.cancel_playback();
    })?;

    let report = handle.wait()?;
    if report.cancelled {
        println!("Cancelled after {} actions", report.actions());
    } else {
        println!(
            "Done! {} moves, {} button transitions in {:.2}s",
            report.moves,
            report.buttons,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}

fn list(store: SessionStore, json: bool) -> Result<()> {
    let engine = Engine::new(NativeBackend::new(), store, EngineConfig::default());
    let entries = engine.list_catalog()?;
    if json {
        return print_json(&Output::ok(entries));
    }
    if entries.is_empty() {
        println!("No recordings saved.");
    } else {
        for entry in entries {
            println!("{}\t{}\t{}", entry.file_reference, entry.name, entry.description);
        }
    }
    Ok(())
}

fn show(store: SessionStore, file: &str, all: bool) -> Result<()> {
    let recording = store.load(file)?;
    println!("Name: {}", recording.name);
    if !recording.description.is_empty() {
        println!("Description: {}", recording.description);
    }
    println!("Events: {}", recording.events.len());
    println!("Duration: {:.2}s", recording.span().as_secs_f64());

    let (mut moves, mut presses, mut releases) = (0, 0, 0);
    for e in &recording.events {
        match e {
            Event::Move { .. } => moves += 1,
            Event::Click { pressed: true, .. } => presses += 1,
            Event::Click { pressed: false, .. } => releases += 1,
        }
    }
    println!("\nSummary: {} moves, {} presses, {} releases", moves, presses, releases);
    if all {
        for (i, e) in recording.events.iter().enumerate() {
            println!("{}: {:?}", i, e);
        }
    }
    Ok(())
}
