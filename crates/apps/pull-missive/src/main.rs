//! pull-missive - cache a Missive team inbox locally
//!
//! Pulls conversations for one inbox within a time window, then each
//! conversation's messages, into msgpack files under the cache directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use missive::{
    FileCacheStore, MissiveCredentials, SyncError, SyncProgress, SyncReport, SyncSettings,
    TimeWindow, load_conversations, load_messages, pull_with_progress,
};

mod cli;

use cli::{Cli, PullArgs};

fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    if let Some(e) = dotenv_problem(dotenv) {
        warn!("Ignoring .env: {}", e);
    }

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let result = match cli.pull_args() {
        Some(args) => run_pull(&args, &cli.cache_dir),
        None => run_summary(&cli.cache_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// A missing .env is normal; anything else is worth reporting
fn dotenv_problem(result: dotenvy::Result<PathBuf>) -> Option<dotenvy::Error> {
    match result {
        Err(e) if !e.not_found() => Some(e),
        _ => None,
    }
}

fn run_pull(args: &PullArgs, cache_dir: &Path) -> Result<()> {
    let window = TimeWindow::resolve(&args.window_request()?, Utc::now())?;
    let credentials = MissiveCredentials::load(args.api_key.clone(), args.inbox_id.clone())?;

    let mut settings = SyncSettings::load().context("Failed to load settings.json")?;
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    debug!("Settings: {:?}", settings);

    let client = settings.client(&credentials);
    let store = FileCacheStore::new(cache_dir);
    info!(
        "Pulling inbox {} in {} into {}",
        credentials.inbox_id,
        window,
        store.root().display()
    );

    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("Loading conversations...");

    let on_progress = |event: SyncProgress<'_>| match event {
        SyncProgress::ConversationsCached { count } => {
            bar.set_length(count as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(format!("{} conversations cached", count));
        }
        SyncProgress::MessagesCached {
            conversation_id,
            count,
            finished,
            ..
        } => {
            bar.set_position(finished as u64);
            bar.set_message(format!("{}: {} messages", conversation_id, count));
        }
        SyncProgress::MessagesFailed {
            conversation_id,
            finished,
            ..
        } => {
            bar.set_position(finished as u64);
            bar.set_message(format!("{}: failed", conversation_id));
        }
    };

    let result = pull_with_progress(
        &client,
        &store,
        &window,
        &settings.sync_options(),
        &on_progress,
    );
    bar.finish_and_clear();

    match result {
        Ok(report) => {
            let stats = &report.stats;
            println!(
                "Cached {} conversations and {} messages in {:.1}s",
                stats.conversations,
                stats.messages,
                stats.duration_ms as f64 / 1000.0
            );
            if stats.duplicates > 0 {
                println!("Dropped {} duplicate records", stats.duplicates);
            }
            Ok(())
        }
        Err(SyncError::Incomplete(report)) => {
            print_incomplete(&report);
            Err(SyncError::Incomplete(report).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_incomplete(report: &SyncReport) {
    for (id, failure) in &report.failed {
        eprintln!("Failed: {} ({})", id, failure);
    }
    match report.last_cached() {
        Some(id) => eprintln!("Last cached conversation: {}", id),
        None => eprintln!("No conversation messages were cached"),
    }
    if !report.skipped.is_empty() {
        let skipped: Vec<&str> = report.skipped.iter().map(|id| id.as_str()).collect();
        eprintln!("Not attempted: {}", skipped.join(", "));
    }
    eprintln!("Re-run the same command to finish the cache.");
}

fn run_summary(cache_dir: &Path) -> Result<()> {
    let conversations = load_conversations(cache_dir)
        .with_context(|| format!("No usable cache in {}", cache_dir.display()))?;

    let mut total = 0;
    for conversation in &conversations {
        let Some(id) = conversation.conversation_id() else {
            continue;
        };
        match load_messages(cache_dir, &id) {
            Ok(messages) => {
                total += messages.len();
                println!("{} {}", id, messages.len());
            }
            Err(e) => println!("{} - ({})", id, e),
        }
    }
    println!(
        "{} conversations, {} messages",
        conversations.len(),
        total
    );
    Ok(())
}
