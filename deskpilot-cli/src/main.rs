//! deskpilot CLI
//!
//! Runs the DWG to GEO batch workflow against the target application and
//! hosts the recording and setup tools.
//!
//! Usage:
//!   deskpilot run --dry-run          # Walk the batch without sending input
//!   deskpilot run --folder laser     # Process every .dwg file in ./laser
//!   deskpilot setup                  # Capture every configured button
//!   deskpilot setup ok               # Capture only the OK button
//!   deskpilot record                 # Record raw clicks and keys until Esc
//!   deskpilot record-steps           # Record, then label each action
//!   deskpilot status                 # Show cursor, folder and buttons
//!   deskpilot reset                  # Forget the resumable cursor

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use deskpilot::config::DEFAULT_CONFIG_FILE;
use deskpilot::observer::DEFAULT_QUEUE_CAPACITY;
use deskpilot::screen::find_window;
use deskpilot::workflow::dwg_to_geo;
use deskpilot::{
    CancellationListener, CancellationToken, ChannelObserver, ConfigStore, ElementLocator,
    FailurePolicy, ItemStatus, RdevInput, RunOptions, RunOutcome, RunReport, WorkflowExecutor,
};
use deskpilot_recorder::{
    action_log, label_actions, step_log, ButtonCapture, CaptureConfig, CaptureFilter,
    InputRecorder, RecordedAction, RecorderConfig, RecorderError,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

mod files;
mod logging;
mod presenter;

#[derive(Parser)]
#[command(name = "deskpilot")]
#[command(about = "🤖 deskpilot - unattended batch automation for desktop applications")]
#[command(
    long_about = "deskpilot plays a fixed sequence of clicks and key presses against every file in a work folder, locating buttons by template matching and resuming where an interrupted run stopped."
)]
struct Cli {
    /// Path to the JSON config document
    #[clap(long, global = true, env = "DESKPILOT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Work folder (defaults to `work_folder` from the config)
    #[clap(long, short)]
    folder: Option<PathBuf>,

    /// Work file extension (defaults to `file_extension` from the config)
    #[clap(long, short)]
    ext: Option<String>,

    /// Resolve every target and log intent, but send no input
    #[clap(long)]
    dry_run: bool,

    /// Ask before every step
    #[clap(long)]
    confirm_steps: bool,

    /// Keep going after a failed file instead of halting the batch
    #[clap(long)]
    skip_failed: bool,
}

#[derive(Parser, Debug)]
struct SetupArgs {
    /// Buttons to capture (defaults to every entry under `buttons`)
    names: Vec<String>,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Log file to write
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// Also save the raw recording as JSON
    #[clap(long)]
    json: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the batch workflow
    Run(RunArgs),
    /// Capture button template images
    Setup(SetupArgs),
    /// Record clicks and key presses until Esc
    Record(RecordArgs),
    /// Record clicks and key presses, then label each one
    RecordSteps(RecordArgs),
    /// Show the persisted state
    Status,
    /// Reset the resumable cursor to the first file
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_batch(&cli.config, args).await,
        Commands::Setup(args) => {
            let config = cli.config.clone();
            tokio::task::spawn_blocking(move || setup_buttons(&config, args.names)).await?
        }
        Commands::Record(args) => {
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from("recorded_actions.txt"));
            tokio::task::spawn_blocking(move || record_actions(&output, args.json.as_deref()))
                .await?
        }
        Commands::RecordSteps(args) => {
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from("labeled_steps.txt"));
            tokio::task::spawn_blocking(move || record_steps(&output, args.json.as_deref()))
                .await?
        }
        Commands::Status => show_status(&cli.config),
        Commands::Reset => {
            let mut store = ConfigStore::open(&cli.config);
            store
                .set_last_processed_index(0)
                .context("Failed to reset the cursor")?;
            println!("✅ Cursor reset, the next run starts at the first file.");
            Ok(())
        }
    }
}

async fn run_batch(config_path: &Path, args: RunArgs) -> Result<()> {
    let store = ConfigStore::open(config_path);
    let folder = args.folder.unwrap_or_else(|| store.work_folder());
    let extension = args.ext.unwrap_or_else(|| store.file_extension());
    let ids = files::discover_work_items(&folder, &extension)?;

    if ids.is_empty() {
        println!(
            "⚠️  No .{} files found in {}",
            extension.trim_start_matches('.'),
            folder.display()
        );
        return Ok(());
    }
    println!(
        "📂 {} .{} file(s) in {}",
        ids.len(),
        extension.trim_start_matches('.'),
        folder.display()
    );

    warn_unconfigured_buttons(&store);
    if let Some(title) = store.window_title() {
        match find_window(&title) {
            Ok(Some(found)) => info!(window = %found, "Target window present"),
            Ok(None) => println!(
                "{} No window titled like '{title}' is open; make sure the application is in front.",
                "⚠️ ".yellow()
            ),
            Err(e) => warn!("Could not list windows: {}", e),
        }
    }

    let token = CancellationToken::new();
    let cancel_key = store.cancel_key();
    CancellationListener::from_key_name(&cancel_key, token.clone())?.spawn();

    let options = RunOptions {
        dry_run: args.dry_run,
        confirm_steps: args.confirm_steps,
        policy: if args.skip_failed {
            FailurePolicy::SkipItem
        } else {
            store.failure_policy()
        },
    };
    if options.dry_run {
        println!("{}", "🧪 Dry run: no input will be sent".cyan());
    }
    println!("⏹  Press {} to abort, Ctrl-C to stop after the current file.", cancel_key.bold());

    let mut executor = WorkflowExecutor::new(
        store,
        ElementLocator::desktop(),
        Box::new(RdevInput::new()),
        token,
        dwg_to_geo(),
    )
    .with_options(options);

    let stop = executor.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n⏸  Stop requested, finishing the current file...");
            stop.request_stop();
        }
    });

    let (observer, rx) = ChannelObserver::channel(DEFAULT_QUEUE_CAPACITY);
    let presenter = tokio::spawn(presenter::present(rx, ids.clone()));
    let report = tokio::task::spawn_blocking(move || executor.run(&ids, &observer, &observer))
        .await
        .context("Workflow worker panicked")?;
    presenter.await.context("Presenter task panicked")?;

    print_report(&report);
    match report.outcome {
        RunOutcome::Failed { index, error } => {
            anyhow::bail!("file {} failed: {error}", index + 1)
        }
        _ => Ok(()),
    }
}

fn warn_unconfigured_buttons(store: &ConfigStore) {
    let missing: Vec<String> = store
        .button_names()
        .into_iter()
        .filter(|name| !store.element_location(name).has_image_file())
        .collect();
    if !missing.is_empty() {
        println!(
            "{} No template image for {}; saved coordinates will be used. Run `deskpilot setup` to capture them.",
            "⚠️ ".yellow(),
            missing.join(", ")
        );
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "═".repeat(60));
    match &report.outcome {
        RunOutcome::Completed => {
            println!("{} all {} file(s) processed", "✅ COMPLETED:".green().bold(), report.items.len())
        }
        RunOutcome::Stopped { cursor } => println!(
            "{} resume later from file {}",
            "⏸  STOPPED:".yellow().bold(),
            cursor + 1
        ),
        RunOutcome::Aborted { cursor } => println!(
            "{} resume later from file {}",
            "⏹  ABORTED:".yellow().bold(),
            cursor + 1
        ),
        RunOutcome::Failed { index, error } => println!(
            "{} file {} - {error}",
            "❌ FAILED:".red().bold(),
            index + 1
        ),
    }
    println!("{}", "─".repeat(60));
    println!("📊 Summary:");
    println!("   • Done: {}", report.count(ItemStatus::Done));
    println!("   • Failed: {}", report.count(ItemStatus::Failed));
    println!("   • Pending: {}", report.count(ItemStatus::Pending));
    println!("   • Cursor: {}", report.cursor);
    println!("{}", "═".repeat(60));
}

fn setup_buttons(config_path: &Path, names: Vec<String>) -> Result<()> {
    let mut store = ConfigStore::open(config_path);
    let names = if names.is_empty() {
        store.button_names()
    } else {
        names
    };
    if names.is_empty() {
        println!("⚠️  No buttons configured under `buttons`.");
        return Ok(());
    }

    let capture = ButtonCapture::new(CaptureConfig::default());
    let mut failures = 0;
    for name in &names {
        println!(
            "\n🎯 Capturing '{}': bring the application to the front and click the button when asked.",
            name.bold()
        );
        let result = capture.capture(name, &mut store, |remaining| {
            if remaining > 0 {
                println!("   Click the button in {remaining}...");
            } else {
                println!("   {}", "Click now!".green().bold());
            }
        });
        match result {
            Ok(captured) => println!(
                "   ✅ Saved {} (fallback {})",
                captured.image.display(),
                captured.click
            ),
            Err(e) => {
                failures += 1;
                println!("   {} Could not capture '{name}': {e}", "❌".red());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} button(s) not captured", names.len());
    }
    Ok(())
}

fn countdown(seconds: u64) {
    println!("Recording will start in {seconds} seconds...");
    println!("Press ESC to stop recording.\n");
    thread::sleep(Duration::from_secs(seconds));
    println!("{}", "RECORDING STARTED!".green().bold());
    println!("{}", "-".repeat(50));
}

fn echo(action: &RecordedAction) {
    println!("  [{:.2}s] {}", action.elapsed_secs(), action);
}

fn record_actions(output: &Path, json: Option<&Path>) -> Result<()> {
    println!("{}", "=".repeat(50));
    println!("       ACTION RECORDER");
    println!("{}\n", "=".repeat(50));
    countdown(3);

    let recording = InputRecorder::new(RecorderConfig::default()).record(echo)?;
    println!("{}", "-".repeat(50));
    println!("{}\n", "RECORDING STOPPED!".yellow().bold());

    std::fs::write(output, action_log(&recording))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if let Some(json) = json {
        recording.save_to_file(json)?;
    }

    println!(
        "Recorded {} actions in {:.2} seconds.",
        recording.actions.len(),
        recording.duration_secs()
    );
    println!("📄 Review the file: {}", output.display());
    Ok(())
}

fn record_steps(output: &Path, json: Option<&Path>) -> Result<()> {
    println!("{}", "=".repeat(50));
    println!("       STEP RECORDER");
    println!("{}\n", "=".repeat(50));
    println!("1. Switch to the target application");
    println!("2. Perform your FULL workflow (all steps)");
    println!("3. Press ESC when done");
    println!("4. Then come back to label each action\n");
    countdown(3);

    let recording = InputRecorder::new(RecorderConfig {
        filter: CaptureFilter::Steps,
        ..RecorderConfig::default()
    })
    .record(echo)?;

    println!("\n{}", "=".repeat(50));
    println!("RECORDING STOPPED - {} actions captured", recording.actions.len());
    println!("{}", "=".repeat(50));
    if let Some(json) = json {
        recording.save_to_file(json)?;
    }
    if recording.actions.is_empty() {
        println!("No actions recorded.");
        return Ok(());
    }

    println!("\nLABELING PHASE");
    println!("For each action, type what it does. Type 'x' to skip.\n");
    let labelled = label_actions(recording.actions, |action, position, total| {
        println!("{}", "-".repeat(40));
        println!("Action {position}/{total}:");
        println!("  {action}");
        presenter::prompt_line("  What does this do? (x to skip): ")
            .map_err(|e| RecorderError::Io(std::io::Error::other(e.to_string())))
    })?;

    if labelled.is_empty() {
        println!("\nNo steps labeled.");
        return Ok(());
    }
    std::fs::write(output, step_log(&labelled, chrono::Local::now()))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("\n✅ {} steps labeled and saved to {}", labelled.len(), output.display());
    Ok(())
}

fn show_status(config_path: &Path) -> Result<()> {
    let store = ConfigStore::open(config_path);
    let folder = store.work_folder();
    let extension = store.file_extension();

    println!("{}", "deskpilot status".bold());
    println!("{}", "─".repeat(60));
    println!("   • Config: {}", config_path.display());
    println!("   • Work folder: {}", folder.display());
    match files::discover_work_items(&folder, &extension) {
        Ok(found) => println!("   • Work files: {} .{extension}", found.len()),
        Err(e) => println!("   • Work files: {} ({e:#})", "unavailable".red()),
    }
    println!("   • Cursor: {}", store.last_processed_index());
    println!("   • Failure policy: {:?}", store.failure_policy());
    println!("   • Cancel key: {}", store.cancel_key());
    if let Some(title) = store.window_title() {
        println!("   • Target window: {title}");
    }

    println!("   • Buttons:");
    for name in store.button_names() {
        let location = store.element_location(&name);
        let image = match &location.image {
            Some(path) if location.has_image_file() => format!("{}", path.display()).green(),
            Some(path) => format!("{} (missing)", path.display()).red(),
            None => "no image".red(),
        };
        let fallback = location
            .fallback
            .map(|point| point.to_string())
            .unwrap_or_else(|| "none".to_string());
        println!("       - {name}: {image}, fallback {fallback}");
    }
    Ok(())
}
