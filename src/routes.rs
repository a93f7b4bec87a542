use crate::error;
use crate::gateway::ApodGateway;
use crate::handlers;
use crate::limiter::IpRateLimiter;
use crate::middleware;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use warp::{Filter, Reply};

/// Full route table. The media route mirrors `mirror::MEDIA_ROUTE`.
pub fn routes(
    gateway: ApodGateway,
    limiter: IpRateLimiter,
    cache_dir: PathBuf,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let gateway = warp::any().map(move || gateway.clone());
    let cache_dir = Arc::new(cache_dir);
    let cache_dir = warp::any().map(move || cache_dir.clone());

    let index = warp::path::end()
        .and(warp::get())
        .and(limiter.filter())
        .and(index_query())
        .and(gateway)
        .and_then(handlers::index_handler);

    let health = warp::path("_health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::health_handler);

    let media = warp::path("static")
        .and(warp::path("apod_cache"))
        .and(warp::path::tail())
        .and(warp::get())
        .and(cache_dir)
        .and_then(handlers::media_handler);

    let api = index
        .or(health)
        .or(media)
        .recover(error::handle_rejection);

    middleware::with_request_id()
        .and(api)
        .map(|request_id: String, reply| middleware::add_request_id_header(reply, request_id))
        .with(warp::reply::with::headers(middleware::security_headers()))
}

/// Query parameters for `/`. A query string that cannot be parsed is treated
/// as empty so the page falls back to today.
fn index_query() -> impl Filter<Extract = (HashMap<String, String>,), Error = Infallible> + Clone {
    warp::query::<HashMap<String, String>>()
        .or(warp::any().map(HashMap::new))
        .unify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ApodCache;
    use crate::mirror::MediaMirror;
    use crate::upstream::{RetryPolicy, UpstreamClient};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use warp::http::StatusCode;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const APOD_PATH: &str = "/planetary/apod";

    fn upstream_for(server: &MockServer) -> UpstreamClient {
        UpstreamClient::new(
            &format!("{}{}", server.uri(), APOD_PATH),
            "test-key".to_string(),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(5),
            },
        )
        .unwrap()
    }

    fn gateway_for(server: &MockServer) -> ApodGateway {
        ApodGateway::new(
            ApodCache::new(16, Duration::from_secs(60)),
            Some(upstream_for(server)),
            None,
        )
    }

    fn unconfigured_gateway() -> ApodGateway {
        ApodGateway::new(ApodCache::new(16, Duration::from_secs(60)), None, None)
    }

    fn body_text(body: &[u8]) -> String {
        String::from_utf8_lossy(body).into_owned()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = TempDir::new().unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        let response = warp::test::request().path("/_health").reply(&filter).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_index_renders_upstream_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(APOD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Pillars of Creation",
                "date": "2024-01-01",
                "explanation": "Gas and dust.",
                "media_type": "image",
                "url": "https://apod.nasa.gov/pillars.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let filter = routes(
            gateway_for(&server),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        let response = warp::test::request()
            .path("/?date=2024-01-01")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response.body());
        assert!(html.contains("Pillars of Creation"));
        assert!(html.contains("https://apod.nasa.gov/pillars.jpg"));
    }

    #[tokio::test]
    async fn test_odd_query_strings_still_render_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(APOD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Any Day",
                "date": "2024-01-02",
                "media_type": "image",
                "url": "https://apod.nasa.gov/any.jpg"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let filter = routes(
            gateway_for(&server),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        for target in [
            "/?date=2024-01-01&date=2024-01-02",
            "/?date=%zz&&=x",
            "/?date",
            "/?date%5B%5D=2024-01-01",
        ] {
            let response = warp::test::request().path(target).reply(&filter).await;
            assert_eq!(response.status(), StatusCode::OK, "query {target}");
            assert_eq!(
                response.headers()["content-type"],
                "text/html; charset=utf-8",
                "query {target}"
            );
            assert!(body_text(response.body()).contains("Any Day"), "query {target}");
        }
    }

    #[tokio::test]
    async fn test_spoofed_forwarded_for_is_still_limited() {
        let dir = TempDir::new().unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(2, 60, false),
            dir.path().to_path_buf(),
        );
        let remote: std::net::SocketAddr = "203.0.113.9:40000".parse().unwrap();

        let mut statuses = Vec::new();
        for i in 0..5 {
            let response = warp::test::request()
                .path("/")
                .remote_addr(remote)
                .header("X-Forwarded-For", format!("198.51.100.{i}"))
                .reply(&filter)
                .await;
            statuses.push(response.status());
        }

        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_renders_degraded_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(APOD_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let filter = routes(
            gateway_for(&server),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        for _ in 0..3 {
            let response = warp::test::request().path("/").reply(&filter).await;
            assert_eq!(response.status(), StatusCode::OK);
            let html = body_text(response.body());
            assert!(html.contains("Failed to contact NASA APOD service."));
            assert!(!html.contains("<article>"));
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_renders_configuration_message() {
        let dir = TempDir::new().unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        let response = warp::test::request().path("/").reply(&filter).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response.body()).contains("NASA_API_KEY not set."));
    }

    #[tokio::test]
    async fn test_rate_limited_client_gets_429_page() {
        let dir = TempDir::new().unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(2, 60, false),
            dir.path().to_path_buf(),
        );

        for _ in 0..2 {
            let response = warp::test::request().path("/").reply(&filter).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = warp::test::request().path("/").reply(&filter).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(body_text(response.body()).contains("Too many requests"));

        let health = warp::test::request().path("/_health").reply(&filter).await;
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_media_route_serves_mirrored_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("apod_2024-01-01.png"), b"PNGDATA").unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        let response = warp::test::request()
            .path("/static/apod_cache/apod_2024-01-01.png")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        assert_eq!(response.body().as_ref(), b"PNGDATA");
    }

    #[tokio::test]
    async fn test_media_route_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        for target in [
            "/static/apod_cache/../../etc/passwd",
            "/static/apod_cache/..%2F..%2Fetc%2Fpasswd",
            "/static/apod_cache//etc/passwd",
        ] {
            let response = warp::test::request().path(target).reply(&filter).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path {target}");
            assert!(!body_text(response.body()).contains("root:"));
        }
    }

    #[tokio::test]
    async fn test_media_route_missing_file_is_404() {
        let dir = TempDir::new().unwrap();
        let filter = routes(
            unconfigured_gateway(),
            IpRateLimiter::new(10, 60, false),
            dir.path().to_path_buf(),
        );

        let response = warp::test::request()
            .path("/static/apod_cache/apod_1999-01-01.jpg")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_links_local_mirror_and_serves_it() {
        let server = MockServer::start().await;
        let image_url = format!("{}/image/y.png", server.uri());
        Mock::given(method("GET"))
            .and(path(APOD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Mirrored",
                "date": "2024-01-01",
                "media_type": "image",
                "url": image_url,
                "hdurl": image_url
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/image/y.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = ApodGateway::new(
            ApodCache::new(16, Duration::from_secs(60)),
            Some(upstream_for(&server)),
            Some(MediaMirror::new(dir.path().to_path_buf()).unwrap()),
        );
        let filter = routes(gateway, IpRateLimiter::new(10, 60, false), dir.path().to_path_buf());

        let page = warp::test::request()
            .path("/?date=2024-01-01")
            .reply(&filter)
            .await;
        assert!(body_text(page.body()).contains(r#"src="/static/apod_cache/apod_2024-01-01.png""#));

        let media = warp::test::request()
            .path("/static/apod_cache/apod_2024-01-01.png")
            .reply(&filter)
            .await;
        assert_eq!(media.status(), StatusCode::OK);
        assert_eq!(media.body().as_ref(), b"PNG");
    }
}
