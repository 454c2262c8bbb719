//! Command-line interface components
//!
//! This module contains CLI-specific code for the Classroom Sync application,
//! including argument parsing, command handlers and the progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, CoursesArgs, GlobalArgs, ReassignArgs, SearchArgs,
    SyncArgs,
};
pub use commands::{
    handle_config, handle_courses, handle_reassign, handle_search, handle_stats, handle_sync,
    handle_uncategorized,
};
pub use progress::{ProgressConfig, ProgressDisplay};
