use crate::error::ApodError;
use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use warp::http::HeaderMap;
use warp::{Filter, Rejection};

pub type RateLimiterState = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Per-client limiter: `requests` per `window_secs`, usable as one burst.
///
/// Clients are keyed by socket peer address. `CF-Connecting-IP` and
/// `X-Forwarded-For` are only honoured with `trust_proxy_headers`, which
/// must stay off unless a proxy in front of the service overwrites them.
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<RateLimiterState>,
    trust_proxy_headers: bool,
}

impl IpRateLimiter {
    pub fn new(requests: u32, window_secs: u64, trust_proxy_headers: bool) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(nonzero!(1u32));
        let window = Duration::from_secs(window_secs.max(1));
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        let limiter = RateLimiter::dashmap(quota);

        Self {
            limiter: Arc::new(limiter),
            trust_proxy_headers,
        }
    }

    /// Rejects with [`ApodError::RateLimitExceeded`] once the caller's quota is spent.
    pub fn filter(&self) -> impl Filter<Extract = (), Error = Rejection> + Clone {
        let limiter = self.clone();
        warp::header::headers_cloned()
            .and(warp::addr::remote())
            .and_then(move |headers: HeaderMap, remote: Option<SocketAddr>| {
                let limiter = limiter.clone();
                async move {
                    let ip = limiter.extract_ip(&headers, remote);
                    if limiter.check(ip) {
                        Ok(())
                    } else {
                        debug!(client = %ip, "Client over rate limit");
                        Err(warp::reject::custom(ApodError::RateLimitExceeded))
                    }
                }
            })
            .untuple_one()
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forgets clients whose quota has fully refilled.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Sweeps stale clients every `period` for as long as the runtime lives.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.retain_recent();
                debug!(clients = limiter.tracked_clients(), "Swept rate limiter state");
            }
        })
    }

    fn extract_ip(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> IpAddr {
        if self.trust_proxy_headers {
            if let Some(ip) = forwarded_ip(headers) {
                return ip;
            }
        }

        remote
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(ip) = headers
        .get("CF-Connecting-IP")
        .and_then(|h| h.to_str().ok())
        .and_then(|ip| IpAddr::from_str(ip.trim()).ok())
    {
        return Some(ip);
    }

    headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|ip| ip.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}
