// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Strand: HTTP client/server plumbing
//
//  Resolver:     IP-literal shortcut over a tokio lookup delegate
//  Channel log:  per-exchange timing, async rolling file writer
//  Config:       YAML + STRAND_ environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod inspect;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use strand_core::{StrandConfig, StrandError};
use strand_observability::{ChannelLog, recover_temp_files};
use strand_resolver::{AsyncResolver, LiteralShortcutResolver};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "strand", version, about = "Strand channel log and resolver tools")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/strand/strand.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve host:port the way outbound connections do.
    Resolve { host: String, port: u16 },
    /// Rename temp files left next to a channel log by an interrupted rotation.
    Recover {
        /// Active log file; defaults to channel_log.path from the config.
        log_path: Option<PathBuf>,
    },
    /// Parse a channel log file (plain or .gz) and summarise it.
    Inspect {
        file: PathBuf,
        /// Print every record as a JSON line.
        #[arg(long)]
        json: bool,
    },
    /// Run the channel log until SIGINT/SIGTERM, then drain it.
    Serve,
}

fn main() {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        error!(error = %format!("{e:#}"), "strand failed");
        let code = e
            .downcast_ref::<StrandError>()
            .map(StrandError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Resolve { host, port } => resolve(&config, &host, port),
        Command::Recover { log_path } => {
            recover(log_path.as_deref().unwrap_or(&config.channel_log.path));
            Ok(())
        }
        Command::Inspect { file, json } => inspect_file(&file, json),
        Command::Serve => serve(&config),
    }
}

fn load_config(path: &Path) -> Result<StrandConfig, StrandError> {
    if path.exists() {
        info!(path = %path.display(), "Loading config file");
    } else {
        info!("No config file found, using defaults and environment");
    }
    // A missing file contributes nothing; environment overrides still apply.
    StrandConfig::load(path)
}

fn resolve(config: &StrandConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("strand-resolver")
        .enable_all()
        .build()?;

    let resolver = LiteralShortcutResolver::new(AsyncResolver::from_config(
        rt.handle().clone(),
        &config.resolver,
    ));
    let addrs = rt.block_on(strand_resolver::resolve(&resolver, host, port))?;
    for addr in addrs {
        println!("{addr}");
    }
    Ok(())
}

fn recover(log_path: &Path) {
    let report = recover_temp_files(log_path);
    for path in &report.recovered {
        println!("recovered\t{}", path.display());
    }
    for path in &report.skipped {
        println!("skipped\t{}", path.display());
    }
    info!(
        recovered = report.recovered.len(),
        skipped = report.skipped.len(),
        "Recovery finished"
    );
}

fn inspect_file(path: &Path, json: bool) -> anyhow::Result<()> {
    let reader = inspect::open(path).map_err(StrandError::from)?;
    let summary = inspect::summarize(reader, |event| {
        if json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize record"),
            }
        }
    })
    .map_err(StrandError::from)?;

    for (line, err) in &summary.unparsable {
        warn!(line, error = %err, "Unparsable channel log line");
    }
    if !json {
        println!("records\t{}", summary.records);
        println!("unparsable\t{}", summary.unparsable.len());
        println!("mean_total_ms\t{:.1}", summary.mean_total_processing_millis());
        println!("max_total_ms\t{}", summary.max_total_processing_millis);
    }
    Ok(())
}

fn serve(config: &StrandConfig) -> anyhow::Result<()> {
    let log = if config.channel_log.enabled {
        Some(ChannelLog::start(&config.channel_log)?)
    } else {
        info!("Channel log disabled");
        None
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Strand is ready");
    rt.block_on(shutdown_signal())?;
    info!("Shutdown signal received, draining channel log...");

    if let Some(log) = log {
        log.shutdown();
        print!("{}", log.metrics().render());
    }
    info!("Strand stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
