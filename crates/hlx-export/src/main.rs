//! Highlight export service binary.
//!
//! Reads one JSON command per line on stdin and answers with one JSON line
//! per command on stdout. Logs go to stderr.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hlx_export::{handle_line, ControllerDeps, ExportConfig, JobController};
use hlx_media::{EncoderProvisioner, FfmpegInvoker};
use hlx_store::{DirectoryProjectCatalog, FileJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting hlx-exporter");

    let config = ExportConfig::from_env();
    info!("Export config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        hlx_export::metrics::install_exporter(addr)
            .with_context(|| format!("failed to start metrics exporter on {}", addr))?;
        info!("Serving metrics on {}", addr);
    }

    let source = config
        .encoder_source()
        .await
        .context("failed to load encoder bundle")?;
    let provisioner = Arc::new(
        EncoderProvisioner::new(source, &config.encoder_install_dir)
            .with_version(&config.encoder_version),
    );

    let mut invoker = FfmpegInvoker::new(config.encoding.clone());
    if let Some(timeout) = config.encode_timeout {
        invoker = invoker.with_timeout(timeout.as_secs());
    }

    let store = FileJobStore::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open job store {}", config.store_path.display()))?;

    let deps = ControllerDeps {
        store: Arc::new(store),
        catalog: Arc::new(DirectoryProjectCatalog::new(&config.projects_root)),
        provisioner,
        invoker: Arc::new(invoker),
    };

    let (controller, report) = JobController::boot(&config, deps)
        .await
        .context("failed to boot export controller")?;
    info!(
        scanned = report.scanned,
        recovered = report.recovered,
        failed = report.failed,
        "Recovery finished"
    );

    if let Err(e) = serve(&controller).await {
        error!("Command loop error: {:#}", e);
    }

    let remaining = controller.shutdown().await;
    if remaining > 0 {
        error!("{} exports did not stop before shutdown timed out", remaining);
    }

    info!("Exporter shutdown complete");
    Ok(())
}

/// Answer commands until stdin closes or Ctrl-C arrives.
async fn serve(controller: &JobController) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received shutdown signal");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("Input closed");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = handle_line(controller, &line).await;
                let mut body = serde_json::to_vec(&response)?;
                body.push(b'\n');
                stdout.write_all(&body).await?;
                stdout.flush().await?;
            }
        }
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

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
}
