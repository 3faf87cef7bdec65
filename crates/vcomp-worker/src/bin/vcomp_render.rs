//! Composition render binary.
//!
//! `vcomp-render <request.json> [--out <result.json>]` renders one request
//! and writes the result JSON. `vcomp-render --schema` prints the request
//! schema.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcomp_media::{check_ffmpeg, check_ffprobe};
use vcomp_models::ProjectRequest;
use vcomp_worker::metrics::init_metrics;
use vcomp_worker::{RenderConfig, Renderer};

#[derive(Parser, Debug)]
#[command(name = "vcomp-render", version, about = "Render a composition request")]
struct Cli {
    /// Composition request JSON.
    #[arg(required_unless_present = "schema")]
    request: Option<PathBuf>,

    /// Write the result JSON here instead of stdout.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print the request JSON schema and exit.
    #[arg(long, conflicts_with_all = ["request", "out"])]
    schema: bool,
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vcomp=info".parse()?);

    // Logs go to stderr; stdout carries the result JSON.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.schema {
        let schema = schemars::schema_for!(ProjectRequest);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }
    let request = cli
        .request
        .ok_or_else(|| anyhow!("a request file is required"))?;
    let out = cli.out;

    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let config = RenderConfig::from_env();
    info!("Render config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match init_metrics(addr) {
            Ok(()) => info!(%addr, "Prometheus metrics listening"),
            Err(e) => warn!(error = %e, "Failed to start metrics exporter"),
        }
    }

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let body = tokio::fs::read(&request)
        .await
        .with_context(|| format!("reading {}", request.display()))?;
    let request: ProjectRequest =
        serde_json::from_slice(&body).context("request is not a valid composition")?;

    let renderer = Renderer::new(config);
    let result = renderer.render(&request).await;

    let json = serde_json::to_string_pretty(&result)?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, &json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Result written");
        }
        None => println!("{}", json),
    }

    if !result.is_complete() {
        error!(
            error = result.error.as_deref().unwrap_or_default(),
            "Render failed"
        );
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from(["vcomp-render", "req.json", "--out", "res.json"]).unwrap();
        assert_eq!(cli.request, Some(PathBuf::from("req.json")));
        assert_eq!(cli.out, Some(PathBuf::from("res.json")));
        assert!(!cli.schema);

        let cli = Cli::try_parse_from(["vcomp-render", "-o", "res.json", "req.json"]).unwrap();
        assert_eq!(cli.request, Some(PathBuf::from("req.json")));

        let cli = Cli::try_parse_from(["vcomp-render", "--schema"]).unwrap();
        assert!(cli.schema);
        assert!(cli.request.is_none());
    }

    #[test]
    fn test_cli_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["vcomp-render"]).is_err());
        assert!(Cli::try_parse_from(["vcomp-render", "a.json", "b.json"]).is_err());
        assert!(Cli::try_parse_from(["vcomp-render", "a.json", "--out"]).is_err());
        assert!(Cli::try_parse_from(["vcomp-render", "--schema", "a.json"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
