use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use map646_stat::bucket::{Stamp, TimeBucket};
use map646_stat::channel::ChannelClient;
use map646_stat::config::AppConfig;
use map646_stat::merge::ConflictPolicy;
use map646_stat::report::{self, ParseErrorPolicy, ReportBuilder};
use map646_stat::snapshot_writer::SnapshotWriter;
use map646_stat::{StatError, rollup, version};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Collects map646 statistics from the stat socket and builds reports from the snapshots.
#[derive(Parser)]
#[command(name = "map646-stat", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    /// Stat socket path (overrides daemon.socket_path).
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write one snapshot of the daemon's counters, then flush them.
    Collect {
        /// Base directory of the snapshot tree.
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
    },
    /// Merge the snapshots matching a time pattern into one report.
    Report {
        /// Directory holding the snapshot files.
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
        /// Time pattern (shell glob with `*`, `?` and `[...]`), e.g. `2023010509*` for one
        /// hour of minute files or `20230105[01]*` for the first twenty hours of a day.
        #[arg(short = 't', long = "time")]
        time: String,
        /// Output file (stdout when omitted).
        #[arg(short = 'w', long = "write")]
        write: Option<PathBuf>,
        /// Abort on the first unparsable snapshot instead of skipping it.
        #[arg(long)]
        strict: bool,
        /// How to resolve counter/subtree shape conflicts.
        #[arg(long, value_enum)]
        conflict_policy: Option<ConflictPolicy>,
    },
    /// Fold the child files of a period (e.g. all minutes of an hour) into one period file.
    Rollup {
        /// Directory holding the files to roll up.
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
        /// Period stamp: YYYY, YYYYMM, YYYYMMDD or YYYYMMDDHH.
        #[arg(short = 't', long = "time")]
        time: String,
    },
    /// Send one raw command to the daemon and print its payload.
    Query { command: String },
    /// Print version information and exit.
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            match e.downcast_ref::<StatError>() {
                Some(StatError::Config(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        config.daemon.socket_path = socket;
    }
    let prefix = config.storage.file_prefix.clone();

    match cli.command {
        Command::Collect { dir } => {
            let base_dir = config.base_dir(dir.as_deref())?;
            let writer = SnapshotWriter::new(ChannelClient::from_config(&config.daemon), base_dir)
                .with_file_prefix(prefix);
            writer.collect(TimeBucket::now()).await?;
        }
        Command::Report {
            dir,
            time,
            write,
            strict,
            conflict_policy,
        } => {
            let base_dir = config.base_dir(dir.as_deref())?;
            let on_parse_error = if strict {
                ParseErrorPolicy::Abort
            } else {
                config.report.on_parse_error
            };
            let built = ReportBuilder::new()
                .file_prefix(prefix)
                .conflict_policy(conflict_policy.unwrap_or(config.report.conflict_policy))
                .on_parse_error(on_parse_error)
                .build(&base_dir, &time)?;
            report::write_report(&built.tree, write.as_deref())?;
        }
        Command::Rollup { dir, time } => {
            let base_dir = config.base_dir(dir.as_deref())?;
            let period: Stamp = time.parse()?;
            anyhow::ensure!(
                period.precision() < 12,
                StatError::Config("rollup period must be coarser than a minute".to_string())
            );
            rollup::rollup(&base_dir, &period, &prefix, config.report.conflict_policy)?;
        }
        Command::Query { command } => {
            let client = ChannelClient::from_config(&config.daemon);
            let payload = client.execute(&command).await?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Command::Version => {
            println!("{}", version::full());
        }
    }

    Ok(())
}
