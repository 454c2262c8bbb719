//! Command handlers for Classroom Sync CLI
//!
//! This module implements the command handlers that connect CLI arguments to
//! the sync engine and the metadata store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::client::{build_clients, ClassroomSource, EnvTokenSource};
use crate::app::orchestrator::Orchestrator;
use crate::app::rate::RateGate;
use crate::app::signals::{cancel_on_shutdown_signal, CancelSignal};
use crate::app::store::MetadataStore;
use crate::app::sync_run::RunStatus;
use crate::cli::{
    ConfigAction, ConfigArgs, CoursesArgs, GlobalArgs, ProgressConfig, ProgressDisplay,
    ReassignArgs, SearchArgs, SyncArgs,
};
use crate::config::AppConfig;
use crate::constants::limits;
use crate::errors::{AppError, Result};

/// Handle the sync command
///
/// Builds the clients and orchestrator from configuration, runs one Sync Run
/// with a live progress display and cancels it cleanly on Ctrl+C.
pub async fn handle_sync(global: &GlobalArgs, args: SyncArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    let config = load_config(global).await?;
    let (client_config, orchestrator_config) = config.to_runtime_config();

    let gate = RateGate::new(
        client_config.rate_limit_rps,
        client_config.rate_burst,
        Duration::from_millis(limits::RATE_JITTER_MS),
    )?;
    let (classroom, drive) = build_clients(
        &client_config,
        Arc::new(EnvTokenSource::default()),
        gate.clone(),
    )?;
    let store = open_store(&config).await?;

    info!(
        "Downloading into {}",
        orchestrator_config.download_root.display()
    );
    let orchestrator = Orchestrator::new(
        Arc::new(classroom),
        Arc::new(drive),
        store,
        gate,
        orchestrator_config,
    )?;

    let cancel = CancelSignal::new();
    let signal_task = cancel_on_shutdown_signal(cancel.clone());

    let mut display = ProgressDisplay::new(ProgressConfig {
        enable_progress_bars: !args.no_progress && !global.quiet,
        ..Default::default()
    });
    display.start(orchestrator.clone());

    let result = orchestrator
        .run_with_cancel(args.to_request(), cancel.clone())
        .await;
    signal_task.abort();

    match result {
        Ok(summary) => {
            display.finish(&summary).await;
            match summary.status {
                RunStatus::Cancelled => {
                    warn!("Sync cancelled; run again to fetch the remaining files");
                    Ok(())
                }
                _ if summary.failed > 0 => Err(AppError::generic(format!(
                    "{} of {} files failed to download",
                    summary.failed, summary.total
                ))),
                _ => Ok(()),
            }
        }
        Err(e) => {
            display.abort().await;
            Err(e.into())
        }
    }
}

/// Handle the courses command
pub async fn handle_courses(global: &GlobalArgs, args: CoursesArgs) -> Result<()> {
    let config = load_config(global).await?;

    let courses = if args.local {
        open_store(&config).await?.list_courses().await?
    } else {
        let client_config = config.client.to_runtime_config();
        let gate = RateGate::new(
            client_config.rate_limit_rps,
            client_config.rate_burst,
            Duration::from_millis(limits::RATE_JITTER_MS),
        )?;
        let (classroom, _) = build_clients(
            &client_config,
            Arc::new(EnvTokenSource::default()),
            gate,
        )?;
        classroom.list_courses(!args.all).await?
    };

    if courses.is_empty() {
        println!("No courses found.");
        return Ok(());
    }

    println!("{:<16} {:<10} NAME", "ID", "STATE");
    for course in &courses {
        let name = match &course.section {
            Some(section) if !section.is_empty() => format!("{} ({})", course.name, section),
            _ => course.name.clone(),
        };
        println!("{:<16} {:<10} {}", course.id, course.state.as_str(), name);
    }
    Ok(())
}

/// Handle the search command
pub async fn handle_search(global: &GlobalArgs, args: SearchArgs) -> Result<()> {
    let config = load_config(global).await?;
    let store = open_store(&config).await?;

    let records = store.search(&args.to_query()).await?;
    debug!("Search returned {} records", records.len());

    if records.is_empty() {
        println!("No matching files.");
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  [{}]  {}",
            record.title,
            record.course_name.as_deref().unwrap_or("Uncategorized"),
            record.local_path.display()
        );
    }
    Ok(())
}

/// Handle the stats command
pub async fn handle_stats(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global).await?;
    let store = open_store(&config).await?;
    let stats = store.aggregate_statistics().await?;

    println!("Files: {}", stats.total_files);
    println!("Size on disk: {} bytes", stats.total_bytes);
    println!("Duplicates: {}", stats.deduplicated);
    println!("Uncategorized: {}", stats.uncategorized);

    if !stats.per_course.is_empty() {
        println!("\nBy course:");
        for course in &stats.per_course {
            println!(
                "   {:<40} {}",
                course.course_name.as_deref().unwrap_or(&course.course_id),
                course.files
            );
        }
    }
    if !stats.per_mime.is_empty() {
        println!("\nBy type:");
        for (mime_type, count) in &stats.per_mime {
            println!("   {:<40} {}", mime_type, count);
        }
    }

    let runs = store.recent_sync_runs(5).await?;
    if !runs.is_empty() {
        println!("\nRecent syncs:");
        for run in &runs {
            println!(
                "   {}  {:<10} {}/{} downloaded, {} duplicates, {} failed",
                run.started_at.format("%Y-%m-%d %H:%M"),
                run.status,
                run.completed,
                run.total,
                run.skipped,
                run.failed
            );
        }
    }
    Ok(())
}

/// Handle the uncategorized command
pub async fn handle_uncategorized(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global).await?;
    let store = open_store(&config).await?;
    let records = store.find_uncategorized().await?;

    if records.is_empty() {
        println!("Every file belongs to a course.");
        return Ok(());
    }
    println!("{:<24} FILE", "MATERIAL");
    for record in &records {
        println!("{:<24} {}", record.material_id, record.local_path.display());
    }
    Ok(())
}

/// Handle the reassign command
pub async fn handle_reassign(global: &GlobalArgs, args: ReassignArgs) -> Result<()> {
    let config = load_config(global).await?;
    let store = open_store(&config).await?;

    let updated = store
        .reassign_material_course(&args.material_id, &args.course_id)
        .await?;
    if updated == 0 {
        return Err(AppError::generic(format!(
            "No records found for material {}",
            args.material_id
        )));
    }

    println!(
        "Moved {} record(s) of material {} to course {}",
        updated, args.material_id, args.course_id
    );
    Ok(())
}

/// Handle configuration management
pub async fn handle_config(global: &GlobalArgs, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = load_config(global).await?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigAction::Init { force } => {
            let path = match &global.config {
                Some(path) => path.clone(),
                None => AppConfig::get_default_config_path()?,
            };
            if path.exists() && !force {
                return Err(AppError::generic(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            AppConfig::write_default_config(&path).await?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

/// Load configuration and apply global command-line overrides
async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    if global.config.is_none() {
        if let Some(path) = AppConfig::initialize_first_run().await? {
            if !global.quiet {
                eprintln!("Created default configuration file: {}", path.display());
            }
        }
    }

    let mut config = AppConfig::load(global.config.clone()).await?;
    if let Some(dir) = &global.download_dir {
        config.storage.download_root = dir.clone();
    }
    Ok(config)
}

async fn open_store(config: &AppConfig) -> Result<MetadataStore> {
    let path = config.storage.database_path();
    ensure_parent(&path).await?;
    Ok(MetadataStore::open(&path).await?)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
