//! Authenticated web gallery over the sorted confidence folders.
//!
//! Routes:
//! - `GET /` - single-page viewer
//! - `POST /login` - JSON credentials, sets the session cookie
//! - `GET /logout` - clears the session cookie
//! - `GET /check-auth` - session probe for the page script
//! - `GET /list-images/:folder` - image index of one confidence bucket
//! - `GET /image/:folder/:file` - raw image bytes

pub mod handlers;
pub mod session;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;

use crate::config::GalleryConfig;
use session::SessionStore;

/// Shared state behind every gallery handler.
#[derive(Clone)]
pub struct GalleryState {
    inner: Arc<GalleryInner>,
}

struct GalleryInner {
    sessions: SessionStore,
    users: HashMap<String, String>,
    image_root: PathBuf,
}

impl GalleryState {
    pub fn from_config(config: &GalleryConfig) -> Self {
        let ttl = config.session_ttl_secs.map(Duration::from_secs);
        Self {
            inner: Arc::new(GalleryInner {
                sessions: SessionStore::new(ttl),
                users: config.users.clone(),
                image_root: PathBuf::from(&config.image_root),
            }),
        }
    }

    pub(crate) fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub(crate) fn users(&self) -> &HashMap<String, String> {
        &self.inner.users
    }

    pub(crate) fn image_root(&self) -> &Path {
        &self.inner.image_root
    }
}

pub fn create_router(state: GalleryState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/check-auth", get(handlers::check_auth))
        .route("/list-images/:folder", get(handlers::list_images))
        .route("/image/:folder/:file", get(handlers::serve_image))
        .with_state(state)
}
