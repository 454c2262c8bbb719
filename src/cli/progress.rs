//! Live progress display for sync runs
//!
//! The display polls [`Orchestrator::status`] on a fixed interval and renders
//! the snapshot with indicatif. When stderr is not a terminal it falls back to
//! a periodic one-line text report.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classroom_sync::app::orchestrator::{Orchestrator, SyncRequest};
//! use classroom_sync::cli::{ProgressConfig, ProgressDisplay};
//!
//! # async fn example(orchestrator: Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
//! let mut display = ProgressDisplay::new(ProgressConfig::default());
//! display.start(orchestrator.clone());
//!
//! let summary = orchestrator.run(SyncRequest::all_active()).await?;
//! display.finish(&summary).await;
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::orchestrator::Orchestrator;
use crate::app::sync_run::{ProgressSnapshot, RunStatus, SyncSummary};
use crate::constants::progress;

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Enable visual progress bars
    pub enable_progress_bars: bool,
    /// How often the snapshot is polled
    pub update_interval: Duration,
    /// Interval between reports in text mode
    pub text_report_interval: Duration,
    /// Maximum width for file names in display
    pub max_filename_width: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            update_interval: progress::POLL_INTERVAL,
            text_report_interval: Duration::from_secs(10),
            max_filename_width: 40,
        }
    }
}

/// Polls a running orchestrator and renders its progress
pub struct ProgressDisplay {
    config: ProgressConfig,
    bar: Option<ProgressBar>,
    update_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    is_terminal: bool,
}

impl ProgressDisplay {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            bar: None,
            update_task: None,
            shutdown_tx: None,
            is_terminal: atty::is(atty::Stream::Stderr),
        }
    }

    /// Start polling `orchestrator` in the background
    pub fn start(&mut self, orchestrator: Orchestrator) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = if self.config.enable_progress_bars && self.is_terminal {
            let bar = ProgressBar::new_spinner();
            bar.set_style(bar_style());
            bar.set_message("Listing courses...");
            bar.enable_steady_tick(Duration::from_millis(120));
            self.bar = Some(bar.clone());
            tokio::spawn(poll_bar(
                orchestrator,
                bar,
                self.config.clone(),
                shutdown_rx,
            ))
        } else {
            tokio::spawn(poll_text(orchestrator, self.config.clone(), shutdown_rx))
        };

        self.shutdown_tx = Some(shutdown_tx);
        self.update_task = Some(task);
        debug!("Progress display started");
    }

    /// Stop polling and print the run's summary
    pub async fn finish(&mut self, summary: &SyncSummary) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.update_task.take() {
            let _ = task.await;
        }
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }

        eprintln!("{}", format_summary(summary));
    }

    /// Stop polling without a summary (the run failed to produce one)
    pub async fn abort(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.update_task.take() {
            let _ = task.await;
        }
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

async fn poll_bar(
    orchestrator: Orchestrator,
    bar: ProgressBar,
    config: ProgressConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let snapshot = orchestrator.status().await;
        if snapshot.status != Some(RunStatus::Enumerating) && snapshot.total_files > 0 {
            bar.set_length(snapshot.total_files);
            bar.set_position(snapshot.processed());
        }
        bar.set_message(render_message(&snapshot, config.max_filename_width));

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(config.update_interval) => {}
        }
    }
}

async fn poll_text(
    orchestrator: Orchestrator,
    config: ProgressConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut last_report = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(config.update_interval) => {}
        }

        if last_report.elapsed() >= config.text_report_interval {
            let snapshot = orchestrator.status().await;
            if snapshot.is_active {
                eprintln!(
                    "Progress: {}/{} files ({:.1}%)",
                    snapshot.processed(),
                    snapshot.total_files,
                    snapshot.overall_progress_percent
                );
            }
            last_report = Instant::now();
        }
    }
}

/// One-line status shown next to the bar
pub fn render_message(snapshot: &ProgressSnapshot, max_width: usize) -> String {
    if snapshot.status == Some(RunStatus::Enumerating) {
        return "Listing courses...".to_string();
    }

    let mut message = format!(
        "{} new, {} duplicates, {} failed",
        snapshot.completed_files, snapshot.duplicates_skipped, snapshot.failed_files
    );
    if let Some(name) = &snapshot.current_file_name {
        message.push_str(" | ");
        message.push_str(&truncate(name, max_width));
    }
    message
}

/// Final report printed after a run
pub fn format_summary(summary: &SyncSummary) -> String {
    let mut out = format!(
        "\nSync {} ({}):\n   Total files: {}\n   Downloaded: {}\n   Duplicates skipped: {}\n   Failed: {}\n   Bytes written: {}\n   Duration: {:.1}s",
        summary.status,
        summary.session_id,
        summary.total,
        summary.completed,
        summary.skipped,
        summary.failed,
        summary.bytes_written,
        summary.duration().as_secs_f64()
    );

    if summary.retries > 0 {
        out.push_str(&format!("\n   Retries: {}", summary.retries));
    }
    if summary.abandoned() > 0 {
        out.push_str(&format!("\n   Not started: {}", summary.abandoned()));
    }
    if !summary.errors.is_empty() {
        out.push_str("\n\nErrors:");
        for error in summary.errors.iter().take(progress::ERRORS_SHOWN) {
            out.push_str(&format!("\n   {}", error));
        }
        if summary.errors.len() > progress::ERRORS_SHOWN {
            out.push_str(&format!(
                "\n   ... and {} more",
                summary.errors.len() - progress::ERRORS_SHOWN
            ));
        }
    }
    out
}

fn truncate(name: &str, max_width: usize) -> String {
    if name.chars().count() <= max_width {
        return name.to_string();
    }
    let kept: String = name.chars().take(max_width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
