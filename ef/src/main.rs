//! ecgfeed - simulated live ECG feed
//!
//! CLI entry point for serving, inspecting and watching the feed, and for
//! analyzing local recordings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use ecgfeed::analysis::{self, Analysis};
use ecgfeed::catalog::Catalog;
use ecgfeed::cli::{Cli, Command};
use ecgfeed::client::FeedClient;
use ecgfeed::config::{Config, LoggingConfig};
use ecgfeed::server;
use ecgfeed::window::{Window, write_window};

fn setup_logging(cli_log_level: Option<&str>, logging: &LoggingConfig) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(logging.level.as_deref());
    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let log_file = fs::File::create(path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load the logging section early (before full config load)
    let logging = Config::load_logging(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), &logging).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Serve { host, port, directory }) => {
            debug!(?host, ?port, ?directory, "main: matched Serve command");
            apply_serve_overrides(&mut config, host, port, directory);
            cmd_serve(&config).await
        }
        Some(Command::Catalog { directory }) => {
            debug!(?directory, "main: matched Catalog command");
            apply_serve_overrides(&mut config, None, None, directory);
            cmd_catalog(&config)
        }
        Some(Command::Watch { url, count, save }) => {
            debug!(?url, ?count, ?save, "main: matched Watch command");
            if let Some(url) = url {
                config.client.url = url;
            }
            cmd_watch(&config, count, save.as_deref()).await
        }
        Some(Command::Analyze {
            file,
            samples,
            field,
            header,
            save,
        }) => {
            debug!(?file, samples, ?field, header, ?save, "main: matched Analyze command");
            let field = field.unwrap_or(config.source.field_index);
            cmd_analyze(&config, &file, samples, field, header, save.as_deref())
        }
        None => {
            debug!("main: no command specified, serving");
            cmd_serve(&config).await
        }
    }
}

fn apply_serve_overrides(config: &mut Config, host: Option<String>, port: Option<u16>, directory: Option<PathBuf>) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(directory) = directory {
        config.source.directory = directory;
    }
}

/// Load the catalog, start the feed and serve until a shutdown signal
async fn cmd_serve(config: &Config) -> Result<()> {
    debug!("cmd_serve: called");

    let (catalog, feed) = ecgfeed::start_feed(config)?;
    if catalog.is_empty() {
        warn!(
            directory = %catalog.directory().display(),
            "No source files found; every window request will answer 404"
        );
    }

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("ecgfeed serving on http://{}{}", addr, server::WINDOW_PATH);

    server::serve(listener, feed.clone(), shutdown_signal()).await?;

    if let Err(e) = feed.shutdown().await {
        debug!(error = %e, "cmd_serve: feed already stopped");
    }
    info!("ecgfeed stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}

/// List the catalog and mark the source `serve` would pick
fn cmd_catalog(config: &Config) -> Result<()> {
    debug!("cmd_catalog: called");

    let catalog = Catalog::load(&config.source.directory, &config.source.extension)
        .context("Failed to load source catalog")?;

    println!(
        "{} {} ({} file{})",
        "Directory:".bold(),
        catalog.directory().display(),
        catalog.len(),
        if catalog.len() == 1 { "" } else { "s" }
    );

    if catalog.is_empty() {
        println!("{}", "No eligible source files".yellow());
        return Ok(());
    }

    let active = match catalog.select(&config.source.selection) {
        Ok(active) => active,
        Err(e) => {
            debug!(error = %e, "cmd_catalog: selection failed");
            println!("{} {}", "Selection:".bold(), e.to_string().red());
            None
        }
    };

    for (i, name) in catalog.entries().iter().enumerate() {
        let is_active = active.as_ref().is_some_and(|a| &a.name == name);
        if is_active {
            println!("{} {:>3}  {}", "*".green().bold(), i, name.green().bold());
        } else {
            println!("  {:>3}  {}", i, name);
        }
    }
    Ok(())
}

/// One summary line per analyzed window
fn print_summary(label: &str, window: &Window, result: &Analysis) {
    let absent = window.iter().filter(|v| v.is_none()).count();
    let bpm = match result.heart_rate_bpm {
        Some(bpm) => format!("{:.1} bpm", bpm).green().bold().to_string(),
        None => "-- bpm".dimmed().to_string(),
    };
    println!(
        "{:<6} samples={:<5} absent={:<4} peaks={:<3} {}",
        label,
        window.len(),
        absent,
        result.peaks.len(),
        bpm
    );
}

/// Analyze the leading samples of a local recording
fn cmd_analyze(config: &Config, file: &Path, samples: u64, field: usize, header: bool, save: Option<&Path>) -> Result<()> {
    debug!(file = %file.display(), samples, field, header, ?save, "cmd_analyze: called");
    config.validate().context("Invalid configuration")?;

    let (window, result) = analysis::analyze_recording(file, field, samples, header, &config.analysis)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;
    if window.is_empty() {
        return Err(eyre::eyre!("No samples found in {}", file.display()));
    }
    if (window.len() as u64) < samples {
        warn!(requested = samples, found = window.len(), "Recording is shorter than requested");
    }

    println!("{} {}", "Recording:".bold(), file.display());
    print_summary("offline", &window, &result);
    println!("{} {:?}", "Peaks:".bold(), result.peaks);

    if let Some(path) = save {
        write_window(path, &window)?;
        println!("Saved {} samples to {}", window.len(), path.display());
    }
    Ok(())
}

/// Poll a running server and print per-window analysis
async fn cmd_watch(config: &Config, count: Option<u64>, save: Option<&Path>) -> Result<()> {
    debug!(?count, ?save, "cmd_watch: called");
    config.validate().context("Invalid configuration")?;

    let client = FeedClient::new(&config.client.url, Duration::from_millis(config.client.timeout_ms))?;
    let mut interval = tokio::time::interval(Duration::from_millis(config.client.interval_ms.max(1)));
    let mut polls = 0u64;

    println!("Watching {}", client.base_url().bold());
    loop {
        if count.is_some_and(|n| polls >= n) {
            debug!(polls, "cmd_watch: poll count reached");
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("cmd_watch: interrupted");
                break;
            }
            _ = interval.tick() => {}
        }
        polls += 1;

        let window = client.fetch_window().await?;
        let result = analysis::analyze(&window, &config.analysis);
        print_summary(&format!("#{}", polls), &window, &result);

        if let Some(path) = save {
            write_window(path, &window)?;
        }
    }

    Ok(())
}
