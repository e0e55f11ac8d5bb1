//! CLI binary for readsai-sync.
//!
//! A thin shim over the library crate that maps CLI flags to `SyncConfig`,
//! picks a storage backend, and prints views.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use readsai_sync::{
    ConversionStatus, Document, FsStorage, HttpStorage, StaticIdentity, StorageProvider,
    SyncConfig, SyncObserver, SyncSession,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Watch-mode observer using indicatif ──────────────────────────────────────

/// Terminal observer: a spinner anchored at the bottom plus one log line per
/// resolved conversion.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Watching");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SyncObserver for CliObserver {
    fn on_poll_start(&self, pending: usize) {
        self.bar.set_message(format!(
            "{pending} conversion{} in progress",
            if pending == 1 { "" } else { "s" }
        ));
    }

    fn on_ready(&self, name: &str) {
        self.bar
            .println(format!("  {} {}  {}", green("✓"), name, dim("ready")));
    }

    fn on_failed(&self, name: &str, detail: &str) {
        self.bar
            .println(format!("  {} {}  {}", red("✗"), name, red(detail)));
    }

    fn on_stalled(&self, name: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("⚠"),
            name,
            yellow("stalled — no artifact after the configured threshold")
        ));
    }

    fn on_drained(&self) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload an EPUB and start tracking its conversion
  readsai --principal alice@example.com upload book1.epub

  # One-shot status of all conversions
  readsai --principal alice@example.com status

  # Poll until every conversion finishes
  readsai --principal alice@example.com watch

  # Download the narrated audio once ready
  readsai --principal alice@example.com fetch book1.epub -o book1.mp3

  # Against the hosted storage gateway instead of a local directory
  readsai --endpoint https://xyz.supabase.co/storage/v1 --bucket readsai \
          --api-key $READSAI_API_KEY --principal alice@example.com status

STORAGE BACKENDS:
  By default objects live in a local directory tree (--root, ./readsai-data).
  An external conversion worker is then anything that drops the derived
  .mp3 into {root}/{principal}/artifacts/. Pass --endpoint to talk to the
  ReadsAI storage gateway instead.

ENVIRONMENT VARIABLES:
  READSAI_PRINCIPAL   Principal (email) scoping all storage paths
  READSAI_ROOT        Local storage root directory
  READSAI_ENDPOINT    Storage gateway base URL
  READSAI_BUCKET      Storage gateway bucket
  READSAI_API_KEY     Storage gateway API key
  READSAI_INTERVAL    Poll interval in milliseconds
"#;

/// Track EPUB-to-audio conversions against ReadsAI storage.
#[derive(Parser, Debug)]
#[command(
    name = "readsai",
    version,
    about = "Upload EPUBs and track their audio conversion state",
    long_about = "Upload EPUB documents to ReadsAI storage and track the state of their \
audio conversion by polling for derived artifacts. Works against a local directory tree \
or the hosted storage gateway.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Principal (email) that scopes all storage paths.
    #[arg(long, env = "READSAI_PRINCIPAL")]
    principal: String,

    /// Local storage root directory (filesystem backend).
    #[arg(long, env = "READSAI_ROOT", default_value = "./readsai-data")]
    root: PathBuf,

    /// Storage gateway base URL; switches to the HTTP backend.
    #[arg(long, env = "READSAI_ENDPOINT")]
    endpoint: Option<String>,

    /// Storage gateway bucket.
    #[arg(long, env = "READSAI_BUCKET", default_value = "readsai")]
    bucket: String,

    /// Storage gateway API key.
    #[arg(long, env = "READSAI_API_KEY")]
    api_key: Option<String>,

    /// Poll interval in milliseconds.
    #[arg(long, env = "READSAI_INTERVAL", default_value_t = 5_000)]
    interval: u64,

    /// Seconds before a pending conversion is reported as stalled
    /// (0 disables stall detection).
    #[arg(long, env = "READSAI_STALL_AFTER", default_value_t = 600)]
    stall_after: u64,

    /// Replace an existing document on upload.
    #[arg(long, env = "READSAI_OVERWRITE")]
    overwrite: bool,

    /// Output structured JSON instead of a table.
    #[arg(long, env = "READSAI_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "READSAI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "READSAI_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an EPUB and start tracking its conversion.
    Upload {
        /// Path to the EPUB file; the upload keeps its file name.
        file: PathBuf,
    },
    /// Reconcile once and print every document with its status.
    Status,
    /// Poll until every tracked conversion resolves.
    Watch,
    /// Download the narrated audio derived from an uploaded document.
    Fetch {
        /// Name of the uploaded source document, e.g. book1.epub.
        name: String,
        /// Write the audio here instead of next to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library logs go to stderr; INFO is suppressed while the spinner or
    // JSON output own the terminal.
    let interactive = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || matches!(cli.command, Command::Watch) && interactive {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Storage backend ──────────────────────────────────────────────────
    let storage: Arc<dyn StorageProvider> = match &cli.endpoint {
        Some(endpoint) => {
            let mut http = HttpStorage::new(endpoint.as_str(), cli.bucket.as_str())
                .context("Failed to build storage gateway client")?;
            if let Some(key) = &cli.api_key {
                http = http.with_api_key(key.as_str());
            }
            Arc::new(http)
        }
        None => Arc::new(FsStorage::new(&cli.root)),
    };

    let config = SyncConfig::builder()
        .poll_interval_ms(cli.interval)
        .stall_after_secs((cli.stall_after > 0).then_some(cli.stall_after))
        .overwrite_uploads(cli.overwrite)
        .build()
        .context("Invalid configuration")?;

    let session = SyncSession::new(
        Arc::new(StaticIdentity::signed_in(cli.principal.as_str())),
        storage,
        config,
    );

    match cli.command {
        Command::Upload { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("Input path has no usable file name")?;

            session
                .upload(name, &bytes)
                .await
                .with_context(|| format!("Failed to upload '{name}'"))?;

            if !cli.quiet {
                eprintln!(
                    "{} Uploaded {} ({} bytes) — conversion in progress",
                    green("✔"),
                    bold(name),
                    bytes.len()
                );
                eprintln!("{}", dim("Run `readsai watch` to poll until it completes."));
            }
        }

        Command::Status => {
            let view = session.refresh().await.context("Reconciliation failed")?;
            print_view(&view, cli.json, cli.quiet)?;
        }

        Command::Watch => {
            // Seed the tracked set from storage: anything uploaded earlier
            // whose artifact has not appeared yet is still converting.
            let view = session.refresh().await.context("Reconciliation failed")?;
            for doc in &view {
                if !doc.status.is_ready() {
                    session.tracker().record_optimistic_upload(&doc.name)?;
                }
            }
            if !session.tracker().has_pending() {
                if !cli.quiet {
                    eprintln!("{} Nothing to watch — all conversions are ready", green("✔"));
                }
                return Ok(());
            }

            let observer: Arc<dyn SyncObserver> = if interactive {
                CliObserver::new() as Arc<dyn SyncObserver>
            } else {
                Arc::new(readsai_sync::NoopObserver)
            };
            let poller = session.watch(observer).context("Failed to start poller")?;
            poller.join().await;

            let view = session.documents();
            print_view(&view, cli.json, cli.quiet)?;
        }

        Command::Fetch { name, output } => {
            let bytes = session
                .fetch_artifact(&name)
                .await
                .with_context(|| format!("Audio for '{name}' is not available"))?;

            let target = output.unwrap_or_else(|| {
                PathBuf::from(readsai_sync::derive_artifact_name(&name))
            });
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("Failed to write '{}'", target.display()))?;

            if !cli.quiet {
                eprintln!(
                    "{} Saved {} ({} bytes)",
                    green("✔"),
                    bold(&target.display().to_string()),
                    bytes.len()
                );
            }
        }
    }

    Ok(())
}

/// Print the document view as a table or JSON.
fn print_view(view: &[Document], json: bool, quiet: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(view).context("Failed to serialize view")?
        );
        return Ok(());
    }
    if quiet {
        return Ok(());
    }
    if view.is_empty() {
        println!("No conversions yet");
        return Ok(());
    }

    let width = view.iter().map(|d| d.name.len()).max().unwrap_or(0);
    for doc in view {
        let status = match doc.status {
            ConversionStatus::Ready => green("ready"),
            ConversionStatus::Pending => dim("pending"),
            ConversionStatus::Stalled => yellow("stalled"),
            ConversionStatus::Failed => red("failed"),
        };
        let size = doc
            .size
            .map(|s| dim(&format!("{s:>9} bytes")))
            .unwrap_or_else(|| dim("        —      "));
        match &doc.failure_detail {
            Some(detail) => println!("{:width$}  {status}  {size}  {}", doc.name, red(detail)),
            None => println!("{:width$}  {status}  {size}", doc.name),
        }
    }
    Ok(())
}
