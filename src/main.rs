//! Classroom Sync CLI application
//!
//! Command-line interface for mirroring classroom course materials into a
//! local, deduplicated library.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use classroom_sync::cli::{
    handle_config, handle_courses, handle_reassign, handle_search, handle_stats, handle_sync,
    handle_uncategorized, Cli, Commands,
};
use classroom_sync::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Ignore errors if the file doesn't exist
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("Classroom Sync v{} starting", env!("CARGO_PKG_VERSION"));

    let global = &cli.global;
    match cli.command {
        Commands::Sync(args) => handle_sync(global, args).await,
        Commands::Courses(args) => handle_courses(global, args).await,
        Commands::Search(args) => handle_search(global, args).await,
        Commands::Stats => handle_stats(global).await,
        Commands::Uncategorized => handle_uncategorized(global).await,
        Commands::Reassign(args) => handle_reassign(global, args).await,
        Commands::Config(args) => handle_config(global, args).await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("classroom_sync={}", log_level).parse() {
        filter = filter.add_directive(directive);
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
