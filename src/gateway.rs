use crate::cache::ApodCache;
use crate::config::Config;
use crate::date::{cache_key, normalize_date_today};
use crate::error::ApodError;
use crate::mirror::MediaMirror;
use crate::models::ApodResult;
use crate::upstream::{RetryPolicy, UpstreamClient};
use tracing::{debug, error, info, warn};

/// Everything between the HTTP adapter and NASA: date normalization, the
/// metadata cache, the upstream call and the optional media mirror.
///
/// Concurrent misses on the same key are not coalesced; both requests reach
/// upstream and the later insert wins.
#[derive(Clone)]
pub struct ApodGateway {
    cache: ApodCache,
    upstream: Option<UpstreamClient>,
    mirror: Option<MediaMirror>,
}

impl ApodGateway {
    /// `upstream` is `None` when no API key is configured; every lookup then
    /// reports [`ApodError::MissingApiKey`].
    pub fn new(
        cache: ApodCache,
        upstream: Option<UpstreamClient>,
        mirror: Option<MediaMirror>,
    ) -> Self {
        Self {
            cache,
            upstream,
            mirror,
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let cache = ApodCache::new(config.cache_size, config.cache_ttl());

        let upstream = match config.api_key() {
            Some(key) => Some(UpstreamClient::new(
                &config.apod_url,
                key,
                RetryPolicy::default(),
            )?),
            None => {
                warn!("NASA_API_KEY is not set; pages will show a configuration error");
                None
            }
        };

        let mirror = if config.mirror_media {
            let mirror = MediaMirror::new(config.cache_dir.clone())?;
            mirror.prepare().await?;
            Some(mirror)
        } else {
            None
        };

        Ok(Self::new(cache, upstream, mirror))
    }

    pub async fn lookup(&self, requested: Option<&str>) -> Result<ApodResult, ApodError> {
        let upstream = self.upstream.as_ref().ok_or(ApodError::MissingApiKey)?;

        let date = normalize_date_today(requested);
        let key = cache_key(date);

        if let Some(cached) = self.cache.get(&key).await {
            debug!(cache_key = %key, "Metadata cache hit");
            return Ok(cached);
        }

        let fetched = upstream.fetch(date).await.map_err(|e| {
            error!(cache_key = %key, error = %e, "Failed to fetch APOD");
            e
        })?;

        let result = match &self.mirror {
            Some(mirror) => mirror.mirror(fetched).await,
            None => fetched,
        };

        info!(cache_key = %key, media_type = ?result.media_type, "Caching APOD metadata");
        self.cache.insert(key, result.clone()).await;
        Ok(result)
    }
}
