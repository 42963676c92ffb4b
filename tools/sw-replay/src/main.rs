//! Replay harness for the TrendoAI offline worker.
//!
//! Provides commands for:
//! - Replaying requests through an installed worker against a live origin
//! - Rendering a push payload the way the worker would show it
//! - Printing the effective configuration
//!
//! ## Usage
//!
//! ```bash
//! # Fetch each URL twice; the second pass should come from cache
//! sw-replay replay --config worker.json /static/css/style.css /static/js/app.js
//!
//! # Treat the URLs as page navigations
//! sw-replay replay --navigate / /blog
//!
//! # Render a push payload
//! sw-replay push '{"body":"hello"}'
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use trendo_common::{init_logging, ResultExt};
use trendo_net::{HttpFetcher, LoaderConfig};
use trendo_sw::{PushMessage, Request, ServiceWorkerContainer, WorkerConfig};

#[derive(Parser)]
#[command(name = "sw-replay")]
#[command(about = "Replay requests through the TrendoAI offline worker")]
struct Cli {
    /// Worker config (JSON). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the worker, then fetch each URL through it
    Replay {
        /// Paths or absolute URLs
        #[arg(required = true)]
        urls: Vec<String>,
        /// Issue the requests as top-level navigations
        #[arg(long)]
        navigate: bool,
        /// How many times to replay the list
        #[arg(short, long, default_value = "2")]
        passes: usize,
        /// Output JSON report path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Render a push payload into the notification the worker would show
    Push {
        /// Raw push body
        payload: String,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Serialize)]
struct ReplayRecord {
    pass: usize,
    url: String,
    status: Option<u16>,
    from_cache: bool,
    bytes: usize,
    error: Option<String>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WorkerConfig> {
    let config = match path {
        Some(path) => WorkerConfig::load(path)?,
        None => {
            let mut config = WorkerConfig::default();
            config.apply_env()?;
            config.validate()?;
            config
        }
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Replay {
            urls,
            navigate,
            passes,
            report,
        } => {
            let records = replay(config, &urls, navigate, passes).await?;

            for record in &records {
                match &record.error {
                    None => println!(
                        "pass {} {:<40} {:>3} {:>7} bytes {}",
                        record.pass,
                        record.url,
                        record.status.unwrap_or_default(),
                        record.bytes,
                        if record.from_cache { "cache" } else { "network" }
                    ),
                    Some(error) => println!("pass {} {:<40} error: {}", record.pass, record.url, error),
                }
            }

            if let Some(report_path) = report {
                let json = serde_json::to_string_pretty(&records)?;
                std::fs::write(&report_path, json)
                    .context(format!("writing {}", report_path.display()))?;
                println!("Report written to: {}", report_path.display());
            }
        }

        Commands::Push { payload } => {
            let rendered = trendo_sw::PushPayload::parse(&PushMessage::new(payload))
                .map(|p| config.notifications.render(p));
            match rendered {
                Some((title, options)) => {
                    println!("{title}");
                    println!("{}", serde_json::to_string_pretty(&options)?);
                }
                None => println!("(no notification: payload absent or malformed)"),
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn replay(
    config: WorkerConfig,
    urls: &[String],
    navigate: bool,
    passes: usize,
) -> anyhow::Result<Vec<ReplayRecord>> {
    let fetcher = HttpFetcher::new(LoaderConfig::new(config.origin.clone()))?;
    let (container, _events) = ServiceWorkerContainer::new(config.origin.clone(), Arc::new(fetcher));

    let targets = urls
        .iter()
        .map(|u| config.resolve(u))
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = container.register(config).await?;
    info!(
        cached = ?outcome.install.cached,
        failed = outcome.install.failed.len(),
        active = outcome.activation.is_some(),
        "Worker registered"
    );

    let mut records = Vec::new();
    for pass in 1..=passes {
        for url in &targets {
            let request = if navigate {
                Request::navigate(url.clone())
            } else {
                Request::get(url.clone())
            };

            let record = match container.fetch(request).await {
                Ok(response) => {
                    let status = response.status;
                    let from_cache = response.from_cache;
                    let body = response.bytes().await?;
                    ReplayRecord {
                        pass,
                        url: url.to_string(),
                        status: Some(status),
                        from_cache,
                        bytes: body.len(),
                        error: None,
                    }
                }
                Err(e) => ReplayRecord {
                    pass,
                    url: url.to_string(),
                    status: None,
                    from_cache: false,
                    bytes: 0,
                    error: Some(e.to_string()),
                },
            };
            records.push(record);
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"cache_name":"trendoai-staging-v2"}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.cache_name, "trendoai-staging-v2");
    }

    #[test]
    fn test_load_config_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        std::fs::write(&path, r#"{"precache":["static/css/style.css"]}"#).unwrap();

        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::parse_from(["sw-replay", "replay", "--navigate", "/", "/blog"]);
        match cli.command {
            Commands::Replay {
                urls,
                navigate,
                passes,
                ..
            } => {
                assert_eq!(urls, vec!["/", "/blog"]);
                assert!(navigate);
                assert_eq!(passes, 2);
            }
            _ => panic!("expected replay"),
        }
    }
}
