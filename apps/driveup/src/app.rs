//! Wires configuration into an [`Uploader`] and runs one upload.

use std::sync::Arc;
use std::time::Duration;

use driveup_auth::{CachingCredentials, CredentialProvider, RefreshTokenSource, StaticCredentials};
use driveup_transfer::{CheckpointStore, ThroughputMeter};
use driveup_uploader::{
    ContainerRef, ContainerResolver, FixedContainer, FolderResolver, HttpTransport,
    SessionNegotiator, TransferEngine, UploadError, UploadEvent, UploadTarget, Uploader,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::Args;
use crate::config::Config;

/// Environment variable that supplies an access token without touching the
/// configuration file.
const ACCESS_TOKEN_ENV: &str = "DRIVEUP_ACCESS_TOKEN";

/// Uploads the file named in `args`.
///
/// Ctrl+C cancels the transfer at the next chunk boundary; the checkpoint
/// stays on disk so the next run resumes.
pub async fn run(config: Config, args: Args) -> anyhow::Result<()> {
    let transport = Arc::new(HttpTransport::new(&config.transport_config())?);
    let http = transport.client().clone();
    let credentials = credentials(&config, http.clone());

    let parent = config.destination();
    let resolver: Arc<dyn ContainerResolver> = match &parent {
        ContainerRef::Named(_) => Arc::new(
            FolderResolver::new(http, credentials.clone())
                .with_files_endpoint(&config.files_endpoint),
        ),
        ContainerRef::Id(id) => Arc::new(FixedContainer::new(id.clone())),
    };

    let negotiator = SessionNegotiator::new(transport.clone(), credentials.clone(), resolver)
        .with_endpoint(&config.upload_endpoint);

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(256);
    let mut engine = TransferEngine::new(transport, credentials, config.engine_config())?
        .with_cancel(cancel.clone())
        .with_events(events_tx);
    if let Some(dir) = config.checkpoint_dir() {
        debug!(dir = %dir.display(), "checkpoints enabled");
        engine = engine.with_checkpoints(CheckpointStore::new(dir));
    }
    let uploader = Uploader::new(negotiator, engine);

    let target = UploadTarget::from_path(&args.file, parent)?;
    info!(
        file = %target.source.display(),
        name = %target.name,
        size = target.total_size,
        "uploading"
    );

    let progress = tokio::spawn(log_events(events_rx));
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current chunk");
                cancel.cancel();
            }
        }
    });

    let result = if args.fresh {
        uploader.upload_fresh(&target).await
    } else {
        uploader.upload(&target).await
    };

    interrupt.abort();
    // Closes the event channel so the logger drains and exits.
    drop(uploader);
    let _ = progress.await;

    match result {
        Ok(report) => {
            info!(
                upload_id = %report.upload_id,
                id = report.object.id.as_deref().unwrap_or("-"),
                name = report.object.name.as_deref().unwrap_or(&target.name),
                resumed_from = ?report.resumed_from,
                elapsed = ?report.elapsed,
                "upload complete"
            );
            Ok(())
        }
        Err(UploadError::Cancelled { acked_offset }) => {
            info!(
                acked_offset,
                total = target.total_size,
                "upload interrupted, run again to resume"
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Refresh-token credentials when a refresh token is configured, otherwise
/// a fixed access token from the environment or the configuration.
fn credentials(config: &Config, http: reqwest::Client) -> Arc<dyn CredentialProvider> {
    let creds = &config.credentials;
    if !creds.refresh_token.is_empty() {
        debug!("using refresh-token credentials");
        let source = RefreshTokenSource::new(
            http,
            &creds.client_id,
            &creds.client_secret,
            &creds.refresh_token,
        )
        .with_token_endpoint(&config.token_endpoint);
        return Arc::new(CachingCredentials::new(source));
    }

    let token = std::env::var(ACCESS_TOKEN_ENV)
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| creds.access_token.clone());
    Arc::new(StaticCredentials::new(token))
}

/// Logs upload events until the engine drops its sender.
async fn log_events(mut rx: mpsc::Receiver<UploadEvent>) {
    let meter = ThroughputMeter::default();

    while let Some(event) = rx.recv().await {
        match event {
            UploadEvent::Started {
                total_bytes,
                offset,
                ..
            } => {
                meter.restart(offset);
                info!(offset, total = total_bytes, "transfer started");
            }
            UploadEvent::Progress {
                acked_bytes,
                total_bytes,
                ..
            } => {
                meter.record(acked_bytes);
                info!(
                    acked = acked_bytes,
                    total = total_bytes,
                    percent = %format!("{:.1}", percent(acked_bytes, total_bytes)),
                    rate = %format_rate(meter.bytes_per_second()),
                    eta = %format_eta(meter.eta(total_bytes)),
                    "progress"
                );
            }
            UploadEvent::Retrying {
                attempt,
                delay,
                reason,
                ..
            } => {
                warn!(attempt, ?delay, %reason, "retrying");
            }
            UploadEvent::Resynchronized { offset, .. } => {
                meter.restart(offset);
                info!(offset, "resynchronized with server");
            }
            UploadEvent::Completed { .. } => debug!("transfer finished"),
            UploadEvent::Failed { error, .. } => debug!(%error, "transfer stopped"),
        }
    }
}

fn percent(acked: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    acked as f64 * 100.0 / total as f64
}

fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_sec.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => {
            let secs = d.as_secs();
            format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
        }
        None => "--:--:--".into(),
    }
}
