//! chamada — face-recognition roll call from the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use chamada_session::capture::{run_live, CaptureError, Frame, FrameSource};
use chamada_session::events::{SessionEvent, StatusCause};
use chamada_session::session::{Session, SessionOptions};

use crate::archive::ArchiveRecognizer;
use crate::config::Config;

mod archive;
mod config;

#[derive(Parser)]
#[command(name = "chamada", about = "Face-recognition roll call", version)]
struct Cli {
    /// Roster file (TOML).
    #[arg(short, long, default_value = "roster.toml")]
    roster: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-shot roll call over captured images
    Roll {
        /// Gallery of enrolled descriptors (JSON)
        #[arg(long)]
        gallery: PathBuf,
        /// Advance a student one toggle step after reconciliation;
        /// repeat the flag to advance further
        #[arg(long, value_name = "NAME")]
        toggle: Vec<String>,
        /// Capture images, each with a <image>.faces.json sidecar
        #[arg(required = true)]
        captures: Vec<PathBuf>,
    },
    /// Poll a snapshot image on an interval until Ctrl-C
    Live {
        /// Gallery of enrolled descriptors (JSON)
        #[arg(long)]
        gallery: PathBuf,
        /// Snapshot file refreshed by the external capture tool
        #[arg(long)]
        snapshot: PathBuf,
        /// Capture interval in milliseconds (default from config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Inspect a gallery file
    Gallery {
        #[arg(long)]
        gallery: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let roster_path = cli.roster;

    match cli.command {
        Commands::Roll {
            gallery,
            toggle,
            captures,
        } => roll(&roster_path, &gallery, &toggle, &captures).await,
        Commands::Live {
            gallery,
            snapshot,
            interval_ms,
        } => live(&roster_path, &gallery, &snapshot, interval_ms).await,
        Commands::Gallery { gallery } => inspect_gallery(&gallery),
    }
}

/// Load config and gallery, build the session, run enrollment.
async fn build_session(
    roster_path: &Path,
    gallery_path: &Path,
) -> anyhow::Result<(Session<ArchiveRecognizer>, Config)> {
    let config = Config::load(roster_path)?;
    let gallery = archive::load_gallery(gallery_path)?;

    let options = SessionOptions {
        match_threshold: config.match_threshold,
        labels: config.labels.clone(),
    };
    let mut session = Session::new(ArchiveRecognizer::new(), config.roster.clone(), options);
    session.subscribe(Box::new(print_status_line));
    session.prepare_from_gallery(gallery).await?;
    Ok((session, config))
}

fn print_status_line(event: &SessionEvent) {
    match event {
        SessionEvent::ModelsLoaded => println!("models loaded"),
        SessionEvent::EnrollmentCompleted(enrollment) => println!(
            "faces ready: {}, failures: {}",
            enrollment.enrolled, enrollment.failed
        ),
        SessionEvent::StatusChanged(change) => {
            let cause = match change.cause {
                StatusCause::Recognition => "recognized",
                StatusCause::Manual => "toggled",
            };
            println!("{} is now {:?} ({cause})", change.student, change.status);
        }
        // The report is printed once at the end of the run.
        SessionEvent::ReportRefreshed(_) => {}
    }
}

fn capture_frame(path: &Path) -> anyhow::Result<Frame> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Frame::from_image(
        &image,
        Some(path.to_string_lossy().into_owned()),
    ))
}

async fn roll(
    roster_path: &Path,
    gallery_path: &Path,
    toggles: &[String],
    captures: &[PathBuf],
) -> anyhow::Result<()> {
    let (mut session, _config) = build_session(roster_path, gallery_path).await?;

    for path in captures {
        let frame = match capture_frame(path) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(capture = %path.display(), error = %err, "could not read capture; skipping");
                continue;
            }
        };
        match session.recognize(&frame).await {
            Ok(outcome) => println!(
                "{}: {} face(s), {} newly present, {} unknown",
                path.display(),
                outcome.results.len(),
                outcome.reconciliation.transitions.len(),
                outcome.reconciliation.unknown_faces
            ),
            Err(err) => {
                warn!(capture = %path.display(), error = %err, "recognition failed; skipping capture");
            }
        }
    }

    for name in toggles {
        if let Err(err) = session.toggle(name) {
            warn!(student = %name, error = %err, "toggle failed");
        }
    }

    print!("{}", session.report());
    Ok(())
}

/// Polls a snapshot file an external capture tool keeps overwriting.
/// The file disappearing means the capture surface is gone.
struct SnapshotSource {
    path: PathBuf,
}

impl FrameSource for SnapshotSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let image = image::open(&self.path)?;
        Ok(Some(Frame::from_image(
            &image,
            Some(self.path.to_string_lossy().into_owned()),
        )))
    }
}

async fn live(
    roster_path: &Path,
    gallery_path: &Path,
    snapshot: &Path,
    interval_ms: Option<u64>,
) -> anyhow::Result<()> {
    let (mut session, config) = build_session(roster_path, gallery_path).await?;
    let interval = Duration::from_millis(interval_ms.unwrap_or(config.capture_interval_ms));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut source = SnapshotSource {
        path: snapshot.to_path_buf(),
    };
    let stats = run_live(&mut session, &mut source, interval, shutdown_rx).await?;

    println!(
        "live capture finished: {} cycle(s), {} failed",
        stats.cycles, stats.failed_cycles
    );
    print!("{}", session.report());
    Ok(())
}

fn inspect_gallery(path: &Path) -> anyhow::Result<()> {
    let gallery = archive::load_gallery(path)?;
    if gallery.is_empty() {
        println!("gallery is empty");
        return Ok(());
    }
    for set in &gallery {
        let dim = set.descriptors.first().map_or(0, |d| d.len());
        println!(
            "{}: {} descriptor(s), {} dims",
            set.label,
            set.descriptors.len(),
            dim
        );
    }
    Ok(())
}
