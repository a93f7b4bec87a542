use crate::error::ApodError;
use crate::gateway::ApodGateway;
use crate::models::HealthResponse;
use crate::page;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use warp::http::header::CONTENT_TYPE;
use warp::path::Tail;
use warp::{Rejection, Reply};

pub async fn index_handler(
    query: HashMap<String, String>,
    gateway: ApodGateway,
) -> Result<impl Reply, Rejection> {
    let html = match gateway.lookup(query.get("date").map(String::as_str)).await {
        Ok(apod) => {
            info!(date = ?apod.date, title = ?apod.title, "Rendering APOD");
            page::render_index(Some(&apod), None)
        }
        Err(e) => {
            debug!(error = %e, "Rendering degraded page");
            page::render_index(None, Some(e.user_message()))
        }
    };

    Ok(warp::reply::html(html))
}

pub async fn health_handler() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&HealthResponse { ok: true }))
}

pub async fn media_handler(tail: Tail, cache_dir: Arc<PathBuf>) -> Result<impl Reply, Rejection> {
    let filename = validate_media_name(tail.as_str())?;
    let path = cache_dir.join(filename);

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(warp::reply::with_header(
            bytes,
            CONTENT_TYPE,
            content_type_for(filename),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(warp::reject::custom(
            ApodError::MediaNotFound(filename.to_string()),
        )),
        Err(e) => {
            error!("Failed to read media file {}: {}", filename, e);
            Err(warp::reject::custom(ApodError::MediaMirror(e.to_string())))
        }
    }
}

/// Only bare file names inside the cache directory are served.
fn validate_media_name(name: &str) -> Result<&str, Rejection> {
    let suspicious = name.is_empty()
        || name.starts_with('/')
        || name.starts_with('.')
        || name.contains("..")
        || name.contains(['/', '\\', '%', '\0']);

    if suspicious {
        return Err(warp::reject::custom(ApodError::InvalidInput(format!(
            "media path {:?}",
            name
        ))));
    }
    Ok(name)
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
