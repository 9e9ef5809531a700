//! Verification worker: watches the archive directory for flagged frames,
//! asks the vision model to score each one, and files the image into the
//! matching `conf_1`..`conf_5` bucket. A model failure never drops an image;
//! it falls back to the lowest bucket.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use zipwatch::archive;
use zipwatch::config::Config;
use zipwatch::vlm::{VlmClient, VlmVerdict};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::load_or_default(CONFIG_PATH);

    info!(
        version = env!("GIT_VERSION"),
        endpoint = %config.vlm.endpoint,
        model = %config.vlm.model,
        watch_dir = %config.vlm.watch_dir,
        "vlm verifier starting"
    );

    let sorted_root = Path::new(&config.vlm.sorted_root);
    archive::ensure_conf_dirs(sorted_root)?;

    let client = VlmClient::from_config(&config.vlm)?;
    let poll_interval = Duration::from_secs(config.vlm.poll_interval_secs);
    let image_delay = Duration::from_secs(config.vlm.image_delay_secs);
    let watch_dir = Path::new(&config.vlm.watch_dir);

    loop {
        if !watch_dir.exists() {
            info!(dir = %watch_dir.display(), "watch dir missing, creating it");
            fs::create_dir_all(watch_dir)
                .with_context(|| format!("failed to create {}", watch_dir.display()))?;
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        let images = archive::list_images(watch_dir)?;
        if images.is_empty() {
            debug!("no images waiting");
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        info!(count = images.len(), "processing batch");

        for image in &images {
            info!(image = %image.display(), "verifying");

            let verdict = match client.verify_image(image).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    warn!(image = %image.display(), error = %err, "verification failed, filing as no potential");
                    VlmVerdict::fallback()
                }
            };

            // The unzip score alone picks the bucket; the other fields are
            // recorded for the log.
            let target = archive::move_to_conf(image, sorted_root, verdict.unzip_confidence)?;
            info!(
                unzip = verdict.unzip_confidence,
                looking = verdict.looking_confidence,
                headcount = verdict.headcount,
                target = %target.display(),
                "sorted"
            );

            tokio::time::sleep(image_delay).await;
        }

        info!("batch complete, waiting for new images");
    }
}
