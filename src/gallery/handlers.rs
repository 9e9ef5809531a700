//! Request handlers for the gallery routes.

use std::fs;
use std::path::Path;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::GalleryState;
use crate::archive;

const GALLERY_PAGE: &str = include_str!("../../assets/gallery.html");
const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("authentication required")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl GalleryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(%detail, "gallery request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

type GalleryResult<T> = Result<T, GalleryError>;

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    success: bool,
}

#[derive(Serialize)]
pub struct AuthStatus {
    #[serde(rename = "loggedIn")]
    logged_in: bool,
}

#[derive(Serialize)]
pub struct ImageEntry {
    name: String,
    path: String,
    size: u64,
}

pub async fn index() -> Html<&'static str> {
    Html(GALLERY_PAGE)
}

/// Checks credentials and opens a session.
///
/// Bad credentials still answer 200 with `success: false`; the page script
/// switches on the body, not the status.
pub async fn login(
    State(state): State<GalleryState>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let authorized = state
        .users()
        .get(&request.username)
        .is_some_and(|password| *password == request.password);

    if !authorized {
        tracing::warn!(username = %request.username, "rejected login");
        return Json(LoginResponse { success: false }).into_response();
    }

    let token = state.sessions().create(&request.username).await;
    tracing::info!(username = %request.username, "login");
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly");
    (
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse { success: true }),
    )
        .into_response()
}

pub async fn logout(State(state): State<GalleryState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Some(username) = state.sessions().remove(&token).await {
            tracing::info!(%username, "logout");
        }
    }
    let cookie = format!("{SESSION_COOKIE}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
    (
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse { success: true }),
    )
        .into_response()
}

pub async fn check_auth(State(state): State<GalleryState>, headers: HeaderMap) -> Json<AuthStatus> {
    let logged_in = match session_token(&headers) {
        Some(token) => state.sessions().validate(&token).await,
        None => false,
    };
    Json(AuthStatus { logged_in })
}

/// Lists the images of one confidence bucket. A bucket directory that does
/// not exist yet reads as empty rather than an error.
pub async fn list_images(
    State(state): State<GalleryState>,
    UrlPath(folder): UrlPath<String>,
    headers: HeaderMap,
) -> GalleryResult<Json<Vec<ImageEntry>>> {
    require_session(&state, &headers).await?;
    if !archive::is_conf_folder(&folder) {
        return Err(GalleryError::NotFound);
    }

    let dir = state.image_root().join(&folder);
    let mut entries = Vec::new();
    if dir.is_dir() {
        let paths = archive::list_images(&dir)
            .map_err(|err| GalleryError::Internal(err.to_string()))?;
        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let size = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
            entries.push(ImageEntry {
                name: name.to_string(),
                path: format!("/image/{folder}/{name}"),
                size,
            });
        }
    }

    Ok(Json(entries))
}

pub async fn serve_image(
    State(state): State<GalleryState>,
    UrlPath((folder, file)): UrlPath<(String, String)>,
    headers: HeaderMap,
) -> GalleryResult<Response> {
    require_session(&state, &headers).await?;
    if !archive::is_conf_folder(&folder) {
        return Err(GalleryError::NotFound);
    }
    // The router never matches '/' inside a segment, keep the guard anyway
    // for encoded separators and parent references.
    if file.contains('/') || file.contains('\\') || file.contains("..") {
        return Err(GalleryError::NotFound);
    }

    let path = state.image_root().join(&folder).join(&file);
    if !path.is_file() {
        return Err(GalleryError::NotFound);
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|err| GalleryError::Internal(err.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, mime_for_extension(&path))],
        bytes,
    )
        .into_response())
}

async fn require_session(state: &GalleryState, headers: &HeaderMap) -> GalleryResult<()> {
    let token = session_token(headers).ok_or(GalleryError::Unauthorized)?;
    if state.sessions().validate(&token).await {
        Ok(())
    } else {
        Err(GalleryError::Unauthorized)
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn mime_for_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}
