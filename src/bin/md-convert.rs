//! CLI binary for md-server-client.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClientConfig` / `ConversionOptions` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use md_server_client::pipeline::payload::is_http_url;
use md_server_client::{ClientConfig, ConversionOptions, ConversionResult, RemoteClient};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a local file (stdout)
  md-convert report.pdf

  # Convert a web page with JavaScript rendering
  md-convert https://example.com --js-rendering -o page.md

  # Convert inline HTML
  md-convert --text '<h1>Hello</h1>' --mime-type text/html

  # Pipe bytes through stdin
  cat slides.pptx | md-convert - --filename slides.pptx

  # Server status
  md-convert --health
  md-convert --formats --json

ENVIRONMENT VARIABLES:
  MD_SERVER_ENDPOINT   Base URL of the md-server API
  MD_SERVER_API_KEY    Bearer token for authenticated servers
  RUST_LOG             Override log filter (e.g. md_server_client=debug)
"#;

/// Convert documents, URLs and text to Markdown through a remote md-server.
#[derive(Parser, Debug)]
#[command(
    name = "md-convert",
    version,
    about = "Convert documents, URLs and text to Markdown through a remote md-server",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path, HTTP/HTTPS URL, or `-` for stdin.
    #[arg(required_unless_present_any = ["text", "health", "formats"])]
    input: Option<String>,

    /// Convert this text instead of a file or URL.
    #[arg(long, conflicts_with = "input", requires = "mime_type")]
    text: Option<String>,

    /// MIME type of `--text` (e.g. text/html).
    #[arg(long)]
    mime_type: Option<String>,

    /// Filename hint for stdin content.
    #[arg(long)]
    filename: Option<String>,

    /// Base URL of the md-server API.
    #[arg(long, env = "MD_SERVER_ENDPOINT", default_value = "http://127.0.0.1:8080")]
    endpoint: String,

    /// API key sent as a Bearer token.
    #[arg(long, env = "MD_SERVER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-attempt timeout in seconds.
    #[arg(long, env = "MD_SERVER_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Retries after the first attempt.
    #[arg(long, env = "MD_SERVER_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base backoff delay in seconds (doubles per retry).
    #[arg(long, env = "MD_SERVER_RETRY_DELAY", default_value_t = 1.0)]
    retry_delay: f64,

    /// Render JavaScript before converting (URL inputs).
    #[arg(long)]
    js_rendering: bool,

    /// Extract embedded images.
    #[arg(long)]
    extract_images: bool,

    /// OCR scanned documents and images.
    #[arg(long)]
    ocr: bool,

    /// Preserve complex formatting.
    #[arg(long)]
    preserve_formatting: bool,

    /// Normalise the Markdown output.
    #[arg(long)]
    clean_markdown: bool,

    /// Server-side conversion timeout in seconds.
    #[arg(long)]
    conversion_timeout: Option<u64>,

    /// Query `GET /health` and exit.
    #[arg(long, conflicts_with_all = ["input", "text", "formats"])]
    health: bool,

    /// Query `GET /formats` and exit.
    #[arg(long, conflicts_with_all = ["input", "text"])]
    formats: bool,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the full result (markdown + metadata) as JSON.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || !cli.json {
        // The spinner covers progress; keep INFO noise off the terminal.
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let client = RemoteClient::new(build_config(&cli)?).context("Failed to create client")?;

    // ── Server queries ───────────────────────────────────────────────────
    if cli.health {
        let health = client.health_check().await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&health)?);
        } else {
            println!("Status:   {}", health.status);
            if let Some(ref v) = health.version {
                println!("Version:  {v}");
            }
            if let Some(up) = health.uptime_seconds {
                println!("Uptime:   {up:.0}s");
            }
        }
        return Ok(());
    }
    if cli.formats {
        let formats = client.get_formats().await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&formats)?);
        } else {
            for (name, info) in &formats.formats {
                println!("{name:<12} {}", dim(&info.to_string()));
            }
        }
        return Ok(());
    }

    // ── Conversion ───────────────────────────────────────────────────────
    let options = build_options(&cli);
    let spinner = (!cli.quiet).then(new_spinner);

    let result = run_conversion(&client, &cli, &options).await;
    if let Some(ref bar) = spinner {
        bar.finish_and_clear();
    }
    let result = result.context("Conversion failed")?;

    write_result(&cli, &result)?;
    client.close();
    Ok(())
}

async fn run_conversion(
    client: &RemoteClient,
    cli: &Cli,
    options: &ConversionOptions,
) -> Result<ConversionResult, md_server_client::ClientError> {
    if let Some(ref text) = cli.text {
        let mime = cli.mime_type.as_deref().unwrap_or_default();
        return client.convert_text(text, mime, options).await;
    }

    let input = cli.input.as_deref().unwrap_or_default();
    if input == "-" {
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .map_err(|e| md_server_client::ClientError::invalid_input(format!("Failed to read stdin: {e}")))?;
        client.convert_content(&bytes, cli.filename.as_deref(), options).await
    } else if is_http_url(input) {
        client.convert_url(input, options).await
    } else {
        client.convert_file(input, options).await
    }
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let retry_delay = Duration::try_from_secs_f64(cli.retry_delay)
        .with_context(|| format!("Invalid --retry-delay {}", cli.retry_delay))?;
    ClientConfig::builder(&cli.endpoint)
        .api_key_opt(cli.api_key.clone())
        .timeout(Duration::from_secs(cli.timeout))
        .max_retries(cli.max_retries)
        .retry_delay(retry_delay)
        .build()
        .context("Invalid configuration")
}

/// Map CLI flags to `ConversionOptions`. Unset flags are not sent.
fn build_options(cli: &Cli) -> ConversionOptions {
    let flag = |set: bool| set.then_some(true);
    ConversionOptions {
        js_rendering: flag(cli.js_rendering),
        extract_images: flag(cli.extract_images),
        ocr_enabled: flag(cli.ocr),
        preserve_formatting: flag(cli.preserve_formatting),
        clean_markdown: flag(cli.clean_markdown),
        timeout: cli.conversion_timeout,
        ..Default::default()
    }
}

fn new_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Converting");
    bar.set_message("waiting for server…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn write_result(cli: &Cli, result: &ConversionResult) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialise result")?
        );
        return Ok(());
    }

    if let Some(ref path) = cli.output {
        write_atomic(path, &result.markdown)
            .with_context(|| format!("Failed to write output file {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{}  {} bytes  {:.2}s  →  {}",
                green("✔"),
                result.metadata.markdown_size,
                result.metadata.processing_time,
                bold(&path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        for warning in &result.metadata.warnings {
            eprintln!("warning: {warning}");
        }
        eprintln!(
            "{}",
            dim(&format!(
                "{} · {} · {}",
                result.request_id, result.metadata.detected_format, result.metadata.source_type
            ))
        );
    }
    Ok(())
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}
