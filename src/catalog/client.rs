//! Catalog HTTP client
//!
//! Searches MusicBrainz for releases matching a track, lists each
//! release's images on the Cover Art Archive, and downloads the chosen
//! image. Every request, retries included, goes through one shared
//! [`RateLimiter`].
//!
//! Failure handling:
//! - timeout, connection failure, 5xx: retried with capped exponential
//!   backoff, then [`CatalogError::Network`]
//! - 429: wait `Retry-After` (or the configured default, never more than
//!   the configured maximum), retry once, then [`CatalogError::RateLimited`]
//! - other 4xx: [`CatalogError::Api`], no retry
//! - malformed body: [`CatalogError::Parse`], no retry

use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::{RateLimiter, RetryPolicy};
use super::transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
use super::{CatalogError, SearchQuery, adapter, dto};
use crate::config::CatalogConfig;
use crate::model::ArtworkCandidate;

/// Rate-limited, retrying catalog client.
pub struct CatalogClient {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    musicbrainz_url: String,
    coverart_url: String,
    max_releases: u32,
    max_download_bytes: u64,
}

impl CatalogClient {
    /// Create a client that talks to the real services.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let transport = ReqwestTransport::new(
            &config.user_agent,
            config.timeout(),
            config.max_download_bytes,
        )
        .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(config: &CatalogConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(config.min_interval()),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                base: Duration::from_millis(config.backoff_base_ms),
                cap: Duration::from_millis(config.backoff_cap_ms),
                rate_limit_default: Duration::from_millis(config.rate_limit_default_ms),
                rate_limit_max: Duration::from_millis(config.rate_limit_max_ms),
            },
            musicbrainz_url: config.musicbrainz_url.trim_end_matches('/').to_string(),
            coverart_url: config.coverart_url.trim_end_matches('/').to_string(),
            max_releases: config.max_releases,
            max_download_bytes: config.max_download_bytes,
        }
    }

    /// Search for artwork candidates, in catalog order.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<ArtworkCandidate>, CatalogError> {
        let lucene = query.to_lucene();
        tracing::info!(target: "catalog", "Searching MusicBrainz for: {}", lucene);

        let releases = self.search_releases(&lucene).await?;
        tracing::debug!(target: "catalog", "Found {} releases", releases.len());

        let mut candidates = Vec::new();
        for release in &releases {
            match self.list_images(&release.id).await {
                Ok(listing) => candidates.extend(adapter::to_candidates(release, &listing)),
                // The service is unreachable; later releases would fail the same way
                Err(e @ (CatalogError::Network { .. } | CatalogError::RateLimited)) => {
                    return Err(e);
                }
                Err(e) => tracing::warn!(
                    target: "catalog",
                    "Skipping cover art for release {}: {}",
                    release.id,
                    e
                ),
            }
        }

        tracing::info!(
            target: "catalog",
            "{} artwork candidates for: {}",
            candidates.len(),
            lucene
        );
        Ok(candidates)
    }

    /// Download a candidate's image.
    ///
    /// The 500px thumbnail is tried first; it already fits the artwork
    /// contract's dimensions and avoids the size guard on large originals.
    /// A rejected thumbnail falls back to the full-size image. Network and
    /// rate-limit failures are returned without a second download.
    pub async fn fetch(&self, candidate: &ArtworkCandidate) -> Result<Vec<u8>, CatalogError> {
        if let Some(ref thumbnail) = candidate.thumbnail_url {
            match self.download(thumbnail).await {
                Ok(bytes) => return Ok(bytes),
                Err(e @ (CatalogError::Network { .. } | CatalogError::RateLimited)) => {
                    return Err(e);
                }
                Err(e) => tracing::warn!(
                    target: "catalog",
                    "Thumbnail {} unusable ({}), trying the original",
                    thumbnail,
                    e
                ),
            }
        }
        self.download(&candidate.source_url).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        tracing::info!(target: "catalog", "Downloading artwork from {}", url);
        let response = self.get(url, "image/*").await?;

        if !response.is_success() {
            return Err(CatalogError::Api {
                status: response.status,
                message: format!("download of {} failed", url),
            });
        }

        let content_type = response.content_type.as_deref().unwrap_or("");
        if !content_type.starts_with("image/") {
            return Err(CatalogError::InvalidResponse(format!(
                "expected an image, got content type {:?}",
                content_type
            )));
        }

        if response.body.len() as u64 > self.max_download_bytes {
            return Err(CatalogError::InvalidResponse(format!(
                "image is {} bytes, limit is {}",
                response.body.len(),
                self.max_download_bytes
            )));
        }

        tracing::debug!(target: "catalog", "Downloaded {} bytes", response.body.len());
        Ok(response.body)
    }

    async fn search_releases(&self, lucene: &str) -> Result<Vec<dto::Release>, CatalogError> {
        let url = format!(
            "{}/release/?query={}&fmt=json&limit={}",
            self.musicbrainz_url,
            urlencoding::encode(lucene),
            self.max_releases
        );

        let response = self.get(&url, "application/json").await?;

        if !response.is_success() {
            // Try to parse error response
            let message = serde_json::from_slice::<dto::ApiError>(&response.body)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("HTTP {}", response.status));
            return Err(CatalogError::Api {
                status: response.status,
                message,
            });
        }

        let parsed: dto::ReleaseSearchResponse = serde_json::from_slice(&response.body)
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(parsed.releases)
    }

    async fn list_images(&self, release_id: &str) -> Result<dto::CoverArtResponse, CatalogError> {
        let url = format!("{}/release/{}", self.coverart_url, release_id);
        let response = self.get(&url, "application/json").await?;

        // No artwork uploaded for this release
        if response.status == 404 {
            return Ok(dto::CoverArtResponse {
                images: Vec::new(),
                release: None,
            });
        }

        if !response.is_success() {
            return Err(CatalogError::Api {
                status: response.status,
                message: format!("cover art listing for {release_id}"),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// One logical GET: rate limited, retried on transient failure.
    ///
    /// Returns any response that is neither 5xx nor 429; callers decide
    /// what 2xx/4xx mean for them.
    async fn get(&self, url: &str, accept: &str) -> Result<HttpResponse, CatalogError> {
        let mut attempt: u32 = 0;
        let mut rate_limited = false;

        loop {
            self.limiter.acquire().await;
            let failure = match self.transport.get(url, accept).await {
                Ok(response) if response.status == 429 => {
                    if rate_limited {
                        return Err(CatalogError::RateLimited);
                    }
                    rate_limited = true;
                    let delay = self.policy.rate_limit_delay(response.retry_after);
                    tracing::warn!(
                        target: "catalog",
                        "Rate limited by server, retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Ok(response) if response.status >= 500 => format!("HTTP {}", response.status),
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => e.to_string(),
                Err(TransportError::BodyTooLarge(limit)) => {
                    return Err(CatalogError::InvalidResponse(format!(
                        "response larger than {limit} bytes"
                    )));
                }
                Err(e) => {
                    return Err(CatalogError::Network {
                        attempts: attempt + 1,
                        message: e.to_string(),
                    });
                }
            };

            if attempt >= self.policy.max_retries {
                tracing::warn!(
                    target: "catalog",
                    "Giving up on {} after {} attempts: {}",
                    url,
                    attempt + 1,
                    failure
                );
                return Err(CatalogError::Network {
                    attempts: attempt + 1,
                    message: failure,
                });
            }

            let delay = self.policy.backoff(attempt);
            attempt += 1;
            tracing::debug!(
                target: "catalog",
                "Transient failure ({}), retry {} in {:.2}s",
                failure,
                attempt,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
