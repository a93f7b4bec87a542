use crate::page;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use warp::{http::StatusCode, reject::Reject, reply::Response, Rejection, Reply};

#[derive(Debug, Error)]
pub enum ApodError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream APOD request failed: {0}")]
    Upstream(String),
    #[error("media mirror failed: {0}")]
    MediaMirror(String),
    #[error("media file not found: {0}")]
    MediaNotFound(String),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("NASA_API_KEY is not configured")]
    MissingApiKey,
}

impl ApodError {
    /// Message shown on the rendered page. Details stay in the server log.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApodError::MissingApiKey => "NASA_API_KEY not set. Configure it in the server environment.",
            ApodError::RateLimitExceeded => "Too many requests. Please slow down and try again shortly.",
            _ => "Failed to contact NASA APOD service.",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    message: String,
}

impl Reject for ApodError {}

pub async fn handle_rejection(err: Rejection) -> Result<Response, std::convert::Infallible> {
    let (code, message) = if let Some(e) = err.find::<ApodError>() {
        match e {
            ApodError::RateLimitExceeded => {
                warn!("Rate limit exceeded");
                let body = warp::reply::html(page::render_rate_limited(e.user_message()));
                return Ok(
                    warp::reply::with_status(body, StatusCode::TOO_MANY_REQUESTS).into_response(),
                );
            }
            ApodError::InvalidInput(msg) => {
                warn!("Rejected invalid input: {}", msg);
                (StatusCode::BAD_REQUEST, "Invalid request path".to_string())
            }
            ApodError::MediaNotFound(_) => (
                StatusCode::NOT_FOUND,
                "The requested media file was not found".to_string(),
            ),
            other => {
                error!("Unexpected error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        }
    } else if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            "The requested resource was not found".to_string(),
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "Invalid query string".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "This method is not allowed for this endpoint".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".to_string(),
        )
    };

    let json = warp::reply::json(&ErrorResponse {
        code: code.as_u16(),
        message,
    });

    Ok(warp::reply::with_status(json, code).into_response())
}
