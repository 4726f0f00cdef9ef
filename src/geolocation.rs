//! Visitor state/territory guess from an IP geolocation service.
//!
//! The guess is fetched once per visitor when the form is rendered and kept
//! in a cache; submissions only ever read the cache and never wait on the
//! lookup. Concurrent page loads for one visitor share a single lookup.
//! Failures are logged and leave the guess absent.

use axum::http::HeaderMap;
use moka::future::Cache;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::errors::{AppError, ResultExt};
use crate::models::GeoLookupResponse;

/// Cache key used when the visitor's address is unknown.
const UNKNOWN_VISITOR: &str = "unknown";

/// Client for the IP geolocation service.
#[derive(Clone)]
pub struct GeolocationService {
    client: reqwest::Client,
    base_url: String,
}

impl GeolocationService {
    /// Creates a new `GeolocationService`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the lookup service, e.g. `https://ipapi.co`.
    /// * `timeout` - Per-lookup timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create geolocation client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn lookup_url(&self, ip: Option<IpAddr>) -> String {
        match ip {
            Some(ip) => format!("{}/{}/json/", self.base_url, ip),
            None => format!("{}/json/", self.base_url),
        }
    }

    /// Looks up an address. `None` looks up the caller's own address.
    pub async fn lookup(&self, ip: Option<IpAddr>) -> Result<GeoLookupResponse, AppError> {
        let url = self.lookup_url(ip);
        tracing::debug!("Geolocation lookup: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Geolocation request failed")?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Geolocation service returned {}",
                response.status()
            )));
        }

        response
            .json::<GeoLookupResponse>()
            .await
            .context("Failed to parse geolocation response")
    }

    /// Australian state or territory for an address, if one can be guessed.
    pub async fn predict_state(&self, ip: Option<IpAddr>) -> Option<String> {
        match self.lookup(ip).await {
            Ok(geo) => geo.australian_region(),
            Err(e) => {
                tracing::error!("Error fetching geolocation data: {}", e);
                None
            }
        }
    }
}

/// Cached state guesses keyed by visitor address.
#[derive(Clone)]
pub struct PredictedStateCache {
    cache: Cache<String, Option<String>>,
}

impl Default for PredictedStateCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 10_000)
    }
}

impl PredictedStateCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_capacity)
                .build(),
        }
    }

    fn key(ip: Option<IpAddr>) -> String {
        ip.map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_VISITOR.to_string())
    }

    /// The cached guess, empty when absent or not resolved yet.
    pub async fn predicted_state(&self, ip: Option<IpAddr>) -> String {
        self.cache
            .get(&Self::key(ip))
            .await
            .flatten()
            .unwrap_or_default()
    }

    /// Resolves and caches the guess for `ip` unless it is already cached.
    ///
    /// Callers racing on the same key wait for the first caller's lookup
    /// instead of starting their own.
    pub async fn warm(&self, service: &GeolocationService, ip: Option<IpAddr>) {
        self.cache
            .get_with(Self::key(ip), async move {
                let state = service.predict_state(ip).await;
                if let Some(ref region) = state {
                    tracing::info!("✓ Predicted state for visitor: {}", region);
                }
                state
            })
            .await;
    }
}

/// Best guess at the visitor's address.
///
/// With `trust_proxy_headers`, proxy headers win over the socket peer:
/// `X-Forwarded-For` (first entry), then `X-Real-IP`. Without it only the
/// peer is used, since anyone can send those headers.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    let peer_ip = peer.map(|addr| addr.ip());
    if !trust_proxy_headers {
        return peer_ip;
    }

    let forwarded: Option<IpAddr> = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    let real_ip = || -> Option<IpAddr> {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };

    forwarded.or_else(real_ip).or(peer_ip)
}
