use std::convert::Infallible;
use tracing::info;
use uuid::Uuid;
use warp::http::header::{
    HeaderMap, HeaderValue, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use warp::path::FullPath;
use warp::{Filter, Reply};

pub fn with_request_id() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::path::full().and_then(|path: FullPath| async move {
        let request_id = Uuid::new_v4().to_string();
        info!(request_id = %request_id, path = %path.as_str(), "Processing request");
        Ok::<_, Infallible>(request_id)
    })
}

pub fn add_request_id_header<T: Reply>(reply: T, request_id: String) -> impl Reply {
    warp::reply::with_header(reply, "X-Request-ID", request_id)
}

pub fn security_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers
}
