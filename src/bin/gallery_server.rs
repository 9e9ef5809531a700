//! Web gallery over the sorted confidence buckets.
//!
//! Serves the single-page viewer plus its JSON endpoints. Credentials and
//! the listen address come from the `[gallery]` section of config.toml.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use zipwatch::archive::{conf_folder_name, MAX_CONFIDENCE, MIN_CONFIDENCE};
use zipwatch::config::Config;
use zipwatch::gallery::{create_router, GalleryState};

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
        addr = %config.gallery.listen_addr,
        image_root = %config.gallery.image_root,
        users = config.gallery.users.len(),
        "gallery server starting"
    );

    let image_root = Path::new(&config.gallery.image_root);
    for level in MIN_CONFIDENCE..=MAX_CONFIDENCE {
        let folder = conf_folder_name(level);
        if image_root.join(&folder).is_dir() {
            info!(%folder, "found bucket");
        } else {
            warn!(%folder, "bucket missing, its tab will read as empty");
        }
    }

    let state = GalleryState::from_config(&config.gallery);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.gallery.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.gallery.listen_addr))?;
    info!("listening on http://{}", config.gallery.listen_addr);

    axum::serve(listener, app)
        .await
        .context("gallery server exited")?;

    Ok(())
}
