use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rollcall_core::{ArcFaceEmbedder, ScrfdDetector};
use rollcall_hw::Camera;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod enroll;
mod ledger;
mod notifier;
mod report;
mod session;
mod sheet;
#[cfg(test)]
mod testing;

use config::Config;
use display::{HeadlessViewer, Overlay, Viewer, WindowViewer};
use ledger::{InitOutcome, Ledger, Student};
use notifier::{Notifier, SmtpMailer};
use session::{Session, SessionError};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition classroom attendance")]
struct Cli {
    /// Config file (default: $ROLLCALL_CONFIG or ./rollcall.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take attendance from the camera until `q`, Ctrl-C, window close or camera failure
    Run {
        /// Do not email absentees at the end
        #[arg(long)]
        no_mail: bool,
        /// Run without a preview window
        #[arg(long)]
        no_display: bool,
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
    /// Add today's rows to the attendance sheet
    Init,
    /// Print today's attendance from the sheet
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Load the models and report which reference faces are usable
    Check,
    /// List video capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let load = || Config::load(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            no_mail,
            no_display,
            duration,
        } => {
            let config = load()?;
            run(
                &config,
                !no_mail && config.mail.enabled,
                !no_display && config.display.enabled,
                duration.map(Duration::from_secs),
            )
        }
        Commands::Init => init(&load()?),
        Commands::Status { json } => status(&load()?, json),
        Commands::Check => check(&load()?),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn roster(config: &Config) -> Vec<Student> {
    config.students.iter().map(Student::from).collect()
}

fn open_ledger(config: &Config) -> Ledger<Box<dyn sheet::SheetStore>> {
    Ledger::new(
        roster(config),
        sheet::open_sheet(&config.attendance_file),
        Local::now().date_naive(),
    )
}

fn load_models(config: &Config) -> Result<(ScrfdDetector, ArcFaceEmbedder)> {
    let detector = ScrfdDetector::load(&config.scrfd_model_path())
        .context("loading face detection model")?;
    let embedder = ArcFaceEmbedder::load(&config.arcface_model_path())
        .context("loading face recognition model")?;
    Ok((detector, embedder))
}

fn run(config: &Config, mail: bool, show_window: bool, limit: Option<Duration>) -> Result<()> {
    let mut ledger = open_ledger(config);
    ledger
        .initialize_for_today()
        .context("preparing attendance sheet")?;

    let (mut detector, mut embedder) = load_models(config)?;
    let (catalog, _) = enroll::build_catalog(&config.students, &mut detector, &mut embedder);
    if catalog.is_empty() {
        tracing::warn!("no reference faces loaded; nobody can be marked present");
    }

    let notifier = if mail {
        let mailer = SmtpMailer::from_config(&config.mail)?;
        Some(Notifier::new(Box::new(mailer), &config.mail.sender)?)
    } else {
        None
    };

    let camera = match Camera::open(&config.camera.device) {
        Ok(camera) => camera,
        Err(e) => {
            tracing::error!(device = %config.camera.device, error = %e, "could not open video source");
            return Err(SessionError::CameraOpen(e).into());
        }
    };
    let mut stream = camera.stream().map_err(SessionError::CameraOpen)?;
    stream.warm_up(config.camera.warmup_frames);

    let mut viewer: Box<dyn Viewer> = if show_window {
        Box::new(WindowViewer::open(camera.width, camera.height).map_err(SessionError::Window)?)
    } else {
        Box::new(HeadlessViewer)
    };
    let overlay = Overlay::with_font_file(config.display.font.as_deref(), config.distance.optimal_cm);

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    println!("Starting attendance system... Press 'q' to quit, 'd' to display attendance status");
    let matcher = config.matcher();
    let outcome = Session::new(
        &mut detector,
        &mut embedder,
        &catalog,
        &matcher,
        config.estimator(),
        &mut ledger,
    )
    .with_downscale(config.camera.detect_downscale)
    .with_interrupt(interrupted)
    .run(&mut stream, viewer.as_mut(), &overlay, notifier.as_ref(), limit);

    tracing::info!(reason = ?outcome.reason, frames = outcome.frames, "session finished");
    if let Some(alerts) = outcome.notify {
        println!("Absence alerts: {} sent, {} failed", alerts.sent.len(), alerts.failed.len());
    }
    Ok(())
}

fn init(config: &Config) -> Result<()> {
    let mut ledger = open_ledger(config);
    match ledger.initialize_for_today()? {
        InitOutcome::Created { rows } => {
            println!("Created {} with {rows} rows", config.attendance_file.display())
        }
        InitOutcome::Appended { rows, last_sno } => {
            println!("Added {rows} rows for {} after S.No {last_sno}", ledger.date())
        }
        InitOutcome::Unchanged => println!("Attendance records for {} already exist", ledger.date()),
    }
    Ok(())
}

fn status(config: &Config, json: bool) -> Result<()> {
    let mut ledger = open_ledger(config);
    let rows = ledger.load_today()?;
    if rows == 0 {
        tracing::warn!(date = %ledger.date(), "no attendance rows for today; run `rollcall init`");
    }

    let summary = ledger.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_summary(&summary);
    }
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    let (mut detector, mut embedder) = load_models(config)?;
    let (catalog, report) = enroll::build_catalog(&config.students, &mut detector, &mut embedder);

    for name in &report.loaded {
        println!("ok       {name}");
    }
    for (name, error) in &report.skipped {
        println!("skipped  {name}: {error}");
    }
    println!("{} of {} reference faces usable", catalog.len(), config.students.len());
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return;
    }
    for device in devices {
        println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
    }
}
