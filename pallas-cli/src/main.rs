//! `pallas_info`: inspects a trace directory written by the Pallas writer/format crates,
//! grounded on the original `pallas_info` tool's table-based summary output.

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

/// Inspect a Pallas trace directory.
#[derive(Parser, Debug)]
#[command(name = "pallas_info", version, about)]
struct Cli {
    /// Verbose mode (forces debug-level logging regardless of PALLAS_DEBUG_LEVEL).
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show the global/per-archive definition tables.
    #[arg(short = 'D', long = "definitions")]
    definitions: bool,

    /// List archives.
    #[arg(long = "la")]
    list_archives: bool,

    /// List threads.
    #[arg(long = "lt")]
    list_threads: bool,

    /// Show full thread content (events, sequences, loops).
    #[arg(short = 't', long = "thread-content")]
    thread_content: bool,

    /// Show each sequence's token content.
    #[arg(long = "content")]
    content: bool,

    /// Show each sequence's per-occurrence durations.
    #[arg(long = "durations")]
    durations: bool,

    /// Show archive details (directory layout, per-archive counts).
    #[arg(long = "da")]
    archive_details: bool,

    /// Only print the archive with this id.
    #[arg(long = "archive")]
    archive: Option<u32>,

    /// Only print the thread with this id.
    #[arg(long = "thread")]
    thread: Option<u32>,

    /// Root directory of the trace (containing main.pallas).
    trace_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pallas_info: {err:#}");
            if is_usage_error(&err) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        },
    }
}

fn is_usage_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<clap::Error>().is_some()
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose {
        "debug"
    } else {
        match std::env::var("PALLAS_DEBUG_LEVEL").as_deref() {
            Ok("quiet") => "error",
            Ok("debug") => "debug",
            Ok("verbose") => "trace",
            _ => "warn",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: &Cli) -> Result<()> {
    let global = pallas_format::load_global(&cli.trace_dir)
        .with_context(|| format!("reading {}", cli.trace_dir.display()))?;

    let opts = report::Options {
        show_definitions: cli.definitions,
        list_archives: cli.list_archives,
        list_threads: cli.list_threads,
        thread_content: cli.thread_content,
        content: cli.content,
        durations: cli.durations,
        archive_details: cli.archive_details,
        archive_filter: cli.archive,
        thread_filter: cli.thread,
    };

    report::print_trace(&cli.trace_dir, &global, &opts)
}
