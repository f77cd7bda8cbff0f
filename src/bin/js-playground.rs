use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use js_playground::trace::{path_summary, summarize_trace, trace_edges, LineHits, TraceEdge};
use js_playground::{
    instrument_code, node_only_reason, EntryKind, FilterKey, OutputEntry, Playground, RunState,
    SandboxConfig, TraceEvent, VisualizationStatus,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(
    name = "js-playground",
    version,
    about = "Run JavaScript snippets in an isolated sandbox"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Snippet file. Reads stdin when neither a file nor --code is given.
    file: Option<PathBuf>,
    /// Inline snippet
    #[arg(long, conflicts_with = "file")]
    code: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a snippet and print its console output
    Run {
        #[command(flatten)]
        source: SourceArgs,
        /// Abort the run after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// V8 heap limit in MiB
        #[arg(long)]
        max_heap_mb: Option<usize>,
        /// Skip line tracing
        #[arg(long)]
        no_viz: bool,
        /// Hide output categories (log, info, warn, error)
        #[arg(long, value_delimiter = ',')]
        hide: Vec<FilterKey>,
        /// Print entries and trace as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report whether a snippet needs a Node.js host
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the instrumented form of a snippet
    Instrument {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    entries: Vec<&'a OutputEntry>,
    trace: &'a [TraceEvent],
    line_hits: Vec<LineHits>,
    edges: Vec<TraceEdge>,
    visualization: &'a VisualizationStatus,
    path: String,
    duration_ms: Option<u128>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run {
            source,
            timeout_ms,
            max_heap_mb,
            no_viz,
            hide,
            json,
        } => {
            let mut config = SandboxConfig::new().with_instrumentation(!no_viz);
            if let Some(ms) = timeout_ms {
                config = config.with_execution_timeout(Duration::from_millis(ms));
            }
            if let Some(mb) = max_heap_mb {
                config = config.with_max_heap_size(heap_bytes(mb)?);
            }
            config.validate()?;
            run_snippet(&read_source(source)?, config, &hide, json).await
        }
        Commands::Check { source } => match node_only_reason(&read_source(source)?) {
            Some(reason) => {
                println!("{reason}");
                Ok(ExitCode::FAILURE)
            }
            None => {
                println!("ok");
                Ok(ExitCode::SUCCESS)
            }
        },
        Commands::Instrument { source } => {
            println!("{}", instrument_code(&read_source(source)?));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn heap_bytes(mb: usize) -> Result<usize> {
    mb.checked_mul(1024 * 1024)
        .with_context(|| format!("--max-heap-mb {mb} is too large"))
}

fn read_source(source: SourceArgs) -> Result<String> {
    match (source.code, source.file) {
        (Some(code), _) => Ok(code),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, None) => std::io::read_to_string(std::io::stdin()).context("failed to read stdin"),
    }
}

async fn run_snippet(
    code: &str,
    config: SandboxConfig,
    hide: &[FilterKey],
    json: bool,
) -> Result<ExitCode> {
    let mut playground = Playground::new(config);
    for key in hide {
        playground.set_filter(*key, false);
    }

    playground.run(code)?;
    playground.settle().await;

    let path = path_summary(playground.trace_events());
    if json {
        let report = RunReport {
            entries: playground.filtered_entries(),
            trace: playground.trace_events(),
            line_hits: summarize_trace(playground.trace_events()),
            edges: trace_edges(playground.trace_events()),
            visualization: playground.visualization_status(),
            path,
            duration_ms: playground.last_run().map(|run| run.duration.as_millis()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in playground.filtered_entries() {
            print_entry(entry);
        }
        if !path.is_empty() {
            println!("\nTimeline: {path}");
        } else if let Some(note) = playground.visualization_note() {
            println!("\n{note}");
        }
        if let Some(run) = playground.last_run() {
            eprintln!("finished in {}", run.duration_label());
        }
    }

    let failed = playground.state() == RunState::Failed
        || playground
            .entries()
            .iter()
            .any(|entry| entry.kind == EntryKind::Error);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_entry(entry: &OutputEntry) {
    let indent = "  ".repeat(entry.depth);
    for line in entry.text.lines() {
        println!("{indent}{line}");
    }
    if entry.text.is_empty() {
        println!();
    }
}
