//! Command-line argument parsing for Classroom Sync
//!
//! This module defines the CLI structure using clap derive macros: syncing
//! course materials, browsing the metadata store and managing configuration.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::app::models::DateRange;
use crate::app::orchestrator::SyncRequest;
use crate::app::store::SearchQuery;
use crate::constants::workers;

/// Classroom Sync - Mirror course materials into a local folder tree
#[derive(Parser, Debug)]
#[command(
    name = "classroom_sync",
    version,
    about = "Download classroom course materials into an organised local library",
    long_about = "Downloads every attachment of your classroom courses into a course/category folder tree.
Identical files are stored once, and a local database keeps them searchable."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Download root, overriding the configuration
    #[arg(long, global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download materials of the selected courses
    Sync(SyncArgs),

    /// List courses
    Courses(CoursesArgs),

    /// Search downloaded files
    Search(SearchArgs),

    /// Show library statistics
    Stats,

    /// List files not filed under any course
    Uncategorized,

    /// Assign a material's files to a course
    Reassign(ReassignArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),
}

/// Arguments for the sync command
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Course to sync; repeat for several. All active courses when omitted
    #[arg(short, long = "course", value_name = "ID")]
    pub courses: Vec<String>,

    /// Only materials created on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Only materials created on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub until: Option<NaiveDate>,

    /// Number of concurrent download workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Disable the live progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the courses command
#[derive(Args, Debug, Clone)]
pub struct CoursesArgs {
    /// Include archived and inactive courses
    #[arg(short, long)]
    pub all: bool,

    /// List courses recorded locally instead of asking the service
    #[arg(long)]
    pub local: bool,
}

/// Arguments for the search command
#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Text matched against titles, file names and descriptions
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Restrict to one course
    #[arg(short, long, value_name = "ID")]
    pub course: Option<String>,

    /// Restrict to a MIME type prefix (e.g. "image/")
    #[arg(short, long, value_name = "PREFIX")]
    pub mime: Option<String>,

    /// Maximum number of results
    #[arg(short, long, default_value = "50")]
    pub limit: u32,
}

/// Arguments for the reassign command
#[derive(Args, Debug, Clone)]
pub struct ReassignArgs {
    /// Material whose records move
    #[arg(value_name = "MATERIAL_ID")]
    pub material_id: String,

    /// Target course
    #[arg(value_name = "COURSE_ID")]
    pub course_id: String,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl SyncArgs {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(count) = self.workers {
            if !(workers::MIN_WORKER_COUNT..=workers::MAX_WORKER_COUNT).contains(&count) {
                return Err(format!(
                    "Number of workers must be between {} and {}",
                    workers::MIN_WORKER_COUNT,
                    workers::MAX_WORKER_COUNT
                ));
            }
        }

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err("--since must not be after --until".to_string());
            }
        }

        Ok(())
    }

    pub fn to_request(&self) -> SyncRequest {
        let mut request = SyncRequest::for_courses(self.courses.iter().cloned())
            .with_range(DateRange::new(self.since, self.until));
        request.worker_count = self.workers;
        request
    }
}

impl SearchArgs {
    pub fn to_query(&self) -> SearchQuery {
        let mut query = SearchQuery::new().limit(self.limit);
        if let Some(text) = self.query.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.text(text.trim());
        }
        if let Some(course) = &self.course {
            query = query.course(course.clone());
        }
        if let Some(mime) = &self.mime {
            query = query.mime_prefix(mime.clone());
        }
        query
    }
}
