use anyhow::{Context, Result};
use clap::Parser;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Clone)]
#[command(author, version, about = "Astronomy Picture of the Day web front end", long_about = None)]
pub struct Config {
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// NASA API key. When missing the index page shows a configuration error.
    #[arg(long, env = "NASA_API_KEY", hide_env_values = true)]
    pub nasa_api_key: Option<String>,

    #[arg(long, env = "APOD_URL", default_value = "https://api.nasa.gov/planetary/apod")]
    pub apod_url: String,

    /// Directory mirrored media files are written to and served from.
    #[arg(long, env = "APOD_CACHE_DIR", default_value = "static/apod_cache")]
    pub cache_dir: PathBuf,

    #[arg(long, env = "CACHE_SIZE", default_value = "256")]
    pub cache_size: usize,

    #[arg(long, env = "CACHE_TTL_SECS", default_value = "3600")]
    pub cache_ttl_secs: u64,

    #[arg(
        long,
        env = "MIRROR_MEDIA",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub mirror_media: bool,

    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value = "30")]
    pub rate_limit_requests: u32,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// Key rate limits on CF-Connecting-IP / X-Forwarded-For instead of the
    /// socket peer. Only enable behind a proxy that overwrites those headers.
    #[arg(
        long,
        env = "TRUST_PROXY_HEADERS",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub trust_proxy_headers: bool,

    /// Fallback filter when RUST_LOG is not set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_JSON", default_value_t = false, action = clap::ArgAction::Set)]
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self::parse())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    /// Empty strings count as unset, matching how the variable is usually blanked out.
    pub fn api_key(&self) -> Option<String> {
        self.nasa_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "nasa_api_key",
                &self.nasa_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("apod_url", &self.apod_url)
            .field("cache_dir", &self.cache_dir)
            .field("cache_size", &self.cache_size)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("mirror_media", &self.mirror_media)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}
