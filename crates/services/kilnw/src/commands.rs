//! Command handlers for the kiln worker.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use kiln_config::{WorkerConfig, worker_config::redact_url};
use kiln_logs::{LogPublisher, redis_channel::RedisChannel};
use kiln_storage::s3::S3Store;
use tracing::{error, info, warn};

use crate::{
    job::BuildJob,
    orchestrator::BuildOrchestrator,
    prelude::*,
    upload::ArtifactUploader,
};

/// Handles the parse command to display the resolved configuration.
pub fn handle_parse(config: &WorkerConfig) -> Result<()> {
    println!("Configuration resolved successfully");
    println!("Project: {}", config.project_id);
    println!("Log broker: {}", redact_url(&config.redis_url));
    println!("  Topic: {}", kiln_logs::topic_for(&config.project_id));
    println!("Storage: {:?}", config.storage);
    println!("Build command: {}", config.build.command);
    println!("  Build directory: {}", config.build.build_dir.display());
    println!("  Output directory: {}", config.build.output_dir.display());
    println!("  Timeout: {:?}", config.build.timeout);
    println!("  Upload on failure: {}", config.build.upload_on_failure);
    println!("Upload concurrency: {}", config.upload.concurrency);
    Ok(())
}

/// Handles the run command: build, stream logs and upload the output.
///
/// The broker connection and the storage client are created once here and
/// handed to the orchestrator.
pub async fn handle_run(config: WorkerConfig) -> Result<()> {
    let channel = RedisChannel::new(config.redis_url.as_str());
    let publisher = LogPublisher::spawn(Arc::new(channel), &config.project_id);
    info!("Publishing logs on {}", publisher.topic());

    let store = S3Store::from_config(&config.storage);
    info!("Uploading to bucket {}", store.bucket());
    let uploader = ArtifactUploader::new(Arc::new(store), config.upload.concurrency);

    let stop = Arc::new(AtomicBool::new(false));
    watch_for_shutdown(Arc::clone(&stop));

    let job = BuildJob::from_config(&config);
    let report = BuildOrchestrator::new(job, publisher, uploader)
        .run(stop)
        .await?;

    info!(
        "Job reached {:?} after build exited with {}",
        report.state, report.exit_status
    );
    let failed = report.failed_uploads();
    if failed > 0 {
        warn!(
            "Finished with {failed} of {} uploads failed",
            report.uploads.len()
        );
        for upload in report.uploads.iter().filter(|u| !u.is_success()) {
            warn!(
                "  {} -> {}: {}",
                upload.relative_path,
                upload.key,
                upload.error.as_deref().unwrap_or_default()
            );
        }
    } else {
        info!("Finished, {} files uploaded", report.uploads.len());
    }
    Ok(())
}

/// Raise `stop` on Ctrl-C so a running build gets killed.
fn watch_for_shutdown(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received Ctrl-C, stopping the build");
                stop.store(true, Ordering::Relaxed);
            }
            Err(err) => error!("Failed to listen for Ctrl-C - {err}"),
        }
    });
}
