use clap::{Parser, Subcommand};
use eoka_guide::capture::{self, CaptureOptions};
use eoka_guide::dom::path_of;
use eoka_guide::resolve::ValidationCache;
use eoka_guide::{
    DirSource, Document, EngineConfig, LoadedRecording, MemoryDocument, Recording,
    RecordingSource, Resolver, Snapshot, Validator,
};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "eoka-guide")]
#[command(about = "Guided-tour playback tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Engine config (YAML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a recording and print its steps in order
    Check {
        recording: PathBuf,
    },

    /// List the recordings in a directory
    List {
        dir: PathBuf,
    },

    /// Resolve a recording's steps against a page snapshot
    Resolve {
        recording: PathBuf,

        /// Snapshot JSON, as written by `capture`
        #[arg(long)]
        snapshot: PathBuf,

        /// Only this step position (default: every step recorded on the snapshot's page)
        #[arg(long)]
        step: Option<i64>,
    },

    /// Snapshot a live page
    Capture {
        url: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> eoka_guide::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = match cli.config {
        Some(ref path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Check { recording } => check(&recording),
        Command::List { dir } => list(dir).await,
        Command::Resolve {
            recording,
            snapshot,
            step,
        } => resolve(&recording, &snapshot, step, &config),
        Command::Capture {
            url,
            output,
            headless,
        } => {
            let options = CaptureOptions {
                headless,
                ..Default::default()
            };
            let snapshot = capture::capture(&url, &options).await?;
            snapshot.save(&output)?;
            println!("Saved {} to {}", snapshot.url, output.display());
            Ok(())
        }
    }
}

fn check(path: &Path) -> eoka_guide::Result<()> {
    let recording = LoadedRecording::new(Recording::load(path)?);
    let rec = recording.recording();
    println!("Recording valid: {}", rec.id);
    if let Some(ref name) = rec.name {
        println!("  Name: {}", name);
    }
    println!("  Steps: {}", recording.len());

    let mut unusable = 0;
    for step in recording.steps() {
        let usable = step.interaction.is_usable();
        if !usable {
            unusable += 1;
        }
        println!(
            "    {} [{}] {} on {}: {}",
            if usable { "✓" } else { "✗" },
            step.position,
            step.interaction,
            step.location(),
            step.annotation
        );
    }

    if unusable > 0 {
        println!();
        println!("{} step(s) have no text, tag or locator", unusable);
        std::process::exit(1);
    }
    Ok(())
}

async fn list(dir: PathBuf) -> eoka_guide::Result<()> {
    let source = DirSource::new(dir);
    let summaries = source.recordings().await?;
    if summaries.is_empty() {
        println!("No recordings in {}", source.dir().display());
    }
    for s in summaries {
        match s.name {
            Some(name) => println!("{}  {} ({} steps)", s.id, name, s.step_count),
            None => println!("{}  ({} steps)", s.id, s.step_count),
        }
    }
    Ok(())
}

fn resolve(
    recording: &Path,
    snapshot: &Path,
    only: Option<i64>,
    config: &EngineConfig,
) -> eoka_guide::Result<()> {
    let recording = LoadedRecording::new(Recording::load(recording)?);
    let doc = MemoryDocument::from_snapshot(Snapshot::load(snapshot)?);
    let here = doc.location();
    println!("Resolving {} against {}", recording.id(), here);

    let resolver = Resolver::new(&doc);
    let validator = Validator::new(&doc);
    let mut cache = ValidationCache::new();
    let mut previous = None;
    let mut failed = 0;

    for step in recording.steps() {
        match only {
            Some(position) if step.position != position => continue,
            None if !step.location().matches(&here) => continue,
            _ => {}
        }

        cache.clear();
        let candidates = resolver.find_candidates(&step.interaction);
        let selection = validator.select(
            &candidates,
            &step.interaction,
            &mut cache,
            config.tie_break,
            previous,
        );
        match selection {
            Some(sel) => {
                let path = path_of(&doc, sel.node).unwrap_or_else(|| sel.node.to_string());
                let note = if sel.is_ambiguous() {
                    format!(" ({} matches)", sel.matches)
                } else {
                    String::new()
                };
                println!("  ✓ [{}] {} -> {}{}", step.position, step.interaction, path, note);
                previous = Some(sel.node);
            }
            None => {
                failed += 1;
                println!(
                    "  ✗ [{}] {}: not found ({} candidates)",
                    step.position,
                    step.interaction,
                    candidates.len()
                );
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
