//! epub-fetch: rebuild a protected packaged document from the resources a
//! running reader application serves for it.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use epub_fetch::{ConnectionPolicy, ExtractConfig, Extractor};
use epub_fetch_cli::{locate_host, prompt, validate_input};

#[derive(Parser)]
#[command(
    name = "epub-fetch",
    about = "Recover a packaged document's resources through the reader's debugging interface",
    version
)]
struct Cli {
    /// Input archive (.epub).
    #[arg(required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Remote debugging port for the host application.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the host application executable.
    /// Also reads from EPUB_FETCH_HOST.
    #[arg(long)]
    executable: Option<PathBuf>,

    /// Readiness polling attempts before giving up.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delay between readiness polls, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Maximum concurrent resource fetches (0 = unbounded).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Multiplex every fetch over one debug connection.
    #[arg(long)]
    shared_connection: bool,

    /// Overwrite an existing output without asking.
    #[arg(short, long)]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print shell completions (bash, zsh, fish, powershell, elvish) and exit.
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

impl Cli {
    /// Environment first, then flags on top.
    fn extract_config(&self) -> ExtractConfig {
        let mut config = ExtractConfig::from_env();
        if let Some(port) = self.port {
            config.debug_port = port;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = self.concurrency {
            config.max_concurrent_fetches = (limit > 0).then_some(limit);
        }
        if self.shared_connection {
            config.connection_policy = ConnectionPolicy::Shared;
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "epub-fetch", &mut io::stdout());
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow!("no input archive given"))?;
    let output = validate_input(&input)?;

    if output.exists() && !cli.yes {
        let question = format!("The file {} already exists. Replace it?", output.display());
        let replace = prompt::confirm(&mut io::stdin().lock(), &mut io::stdout(), &question)?;
        if !replace {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    let executable = match locate_host(cli.executable.as_deref()) {
        Some(path) => path,
        None => prompt::ask_path(
            &mut io::stdin().lock(),
            &mut io::stdout(),
            "Host application executable not found. Enter its full path",
        )?
        .filter(|p| p.is_file())
        .ok_or_else(|| anyhow!("host application executable not found"))?,
    };

    let config = cli.extract_config();
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        host = %executable.display(),
        port = config.debug_port,
        "starting extraction"
    );

    let report = Extractor::new(config)
        .run(&executable, &input, &output)
        .await
        .with_context(|| format!("extracting {}", input.display()))?;

    println!(
        "Fetched {} of {} resources ({} failed, {} documents sanitized).",
        report.fetched, report.candidates, report.failed, report.sanitized
    );
    println!(
        "Wrote {} ({} entries, {} replaced, {} dropped).",
        output.display(),
        report.entries_written,
        report.entries_overridden,
        report.entries_dropped
    );
    Ok(())
}
