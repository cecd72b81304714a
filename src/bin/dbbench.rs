use anyhow::{ensure, Context};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use dbbench::bencher::Bencher;
use dbbench::config::parse_pause;
use dbbench::coordinator::{Coordinator, Filter};
use dbbench::databases::dry_run::DryRun;
use dbbench::databases::sqlite::{self, Sqlite};
use dbbench::harness::{BenchConfig, CancelToken};
use dbbench::schema::{BenchReport, RunMeta, SCHEMA_VERSION};
use dbbench::signal::install_interrupt_handler;
use dbbench::{report, script, OutputFormat};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark an SQLite database file (or a private in-memory database).
    Sqlite {
        #[arg(long, default_value = sqlite::MEMORY)]
        path: String,
    },

    /// Render and count statements without executing them.
    DryRun,

    /// Merge the CSV summaries of several runs into one file.
    MergeCsv {
        /// Directory holding the CSV files; subdirectories are not searched.
        #[arg(long, value_name = "DIR")]
        root_dir: PathBuf,

        #[arg(long, value_name = "FILE")]
        target_file: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(name = "dbbench")]
#[command(about = "Scriptable database benchmark runner")]
struct Args {
    /// Global iteration count; loop benchmarks scale it by their ratio.
    #[arg(long, default_value_t = 1000, global = true)]
    iter: u64,

    /// Concurrent workers per benchmark.
    #[arg(long, default_value_t = 25, global = true)]
    threads: usize,

    /// Pause between benchmarks, e.g. `500ms` or `1m30s`.
    #[arg(long, default_value = "0", value_parser = parse_pause, global = true)]
    sleep: Duration,

    /// Skip creating the schema of the built-in workload.
    #[arg(long, default_value_t = false, global = true)]
    nosetup: bool,

    /// Skip the cleanup before the run.
    #[arg(long, default_value_t = false, global = true)]
    nocleanstart: bool,

    /// Keep benchmark data after the run.
    #[arg(long, default_value_t = false, global = true)]
    keep: bool,

    /// Space separated benchmark names to run, or `all`.
    #[arg(long, default_value = "all", global = true)]
    run: String,

    /// Script file replacing the built-in workload.
    #[arg(long, value_name = "FILE", global = true)]
    script: Option<PathBuf>,

    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Where to write the report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Also write the summaries as CSV.
    #[arg(long, value_name = "FILE", global = true)]
    write_csv: Option<PathBuf>,

    #[arg(long, short, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

/// Runs the final cleanup even when the run fails half way.
struct CleanupGuard<B: Bencher> {
    bencher: Arc<B>,
    enabled: bool,
}

impl<B: Bencher> Drop for CleanupGuard<B> {
    fn drop(&mut self) {
        if self.enabled {
            self.bencher.cleanup(true);
        }
    }
}

fn run<B: Bencher + 'static>(bencher: Arc<B>, args: &Args) -> anyhow::Result<()> {
    ensure!(args.iter > 0, "--iter must be positive");

    let descriptors = match &args.script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            script::parse_script(BufReader::new(file))
                .with_context(|| format!("failed to parse script {}", path.display()))?
        }
        None => bencher.benchmarks(),
    };

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    if !args.nocleanstart {
        bencher.cleanup(false);
    }
    if !args.nosetup {
        bencher.setup().context("setup failed")?;
    }
    let _cleanup = CleanupGuard {
        bencher: bencher.clone(),
        enabled: !args.keep,
    };

    let config = BenchConfig {
        iterations: args.iter,
        workers: args.threads,
        seed: args.seed,
        pause: args.sleep,
    };
    let coordinator = Coordinator::new(bencher.name(), bencher.clone(), config, cancel);
    let outcome = coordinator.run(&descriptors, &Filter::parse(&args.run))?;
    if outcome.interrupted {
        warn!(finished = outcome.summaries.len(), "run was interrupted");
    }

    if let Some(path) = &args.write_csv {
        report::write_csv_file(path, &outcome.summaries)?;
    }

    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    match args.format {
        OutputFormat::Text => report::print_text(&mut out, &outcome.summaries, outcome.elapsed)?,
        OutputFormat::Json => {
            let report = BenchReport {
                run: RunMeta {
                    schema_version: SCHEMA_VERSION,
                    bench_version: env!("CARGO_PKG_VERSION").to_string(),
                    system: bencher.name().to_string(),
                    iterations: args.iter,
                    workers: args.threads.max(1),
                    seed: args.seed,
                    timestamp_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    git_sha: git_sha_short(),
                },
                summaries: outcome.summaries,
                interrupted: outcome.interrupted,
                elapsed_us: outcome.elapsed.as_micros(),
            };
            writeln!(out, "{}", report::to_json(&report)?)?;
        }
    }
    out.flush()?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match &args.cmd {
        Command::Sqlite { path } => {
            let db = Sqlite::open(path).with_context(|| format!("failed to open {path}"))?;
            run(Arc::new(db), &args)
        }
        Command::DryRun => {
            let dry = Arc::new(DryRun::new());
            run(dry.clone(), &args)?;
            info!(statements = dry.executed(), "dry run finished");
            Ok(())
        }
        Command::MergeCsv {
            root_dir,
            target_file,
        } => {
            let stats = report::merge_csv(root_dir, target_file)?;
            info!(
                merged = stats.files_merged,
                skipped = stats.files_skipped,
                rows = stats.rows,
                target = %target_file.display(),
                "merged csv files"
            );
            Ok(())
        }
    }
}
