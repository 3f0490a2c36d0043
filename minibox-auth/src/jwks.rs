//! Identity provider signing keys.
//!
//! [`JwksCache`] fetches `/.well-known/jwks.json` on first use and keeps the
//! RSA keys in memory by `kid`. Keys are re-fetched when the cached set is
//! older than the configured refresh interval, or once when a token names a
//! `kid` the cached set does not contain (provider key rotation).
//!
//! Concurrent misses share one fetch: every refresh runs under a single
//! async lock and carries a generation number, so a task that waited on the
//! lock sees that the set it had observed was already replaced and uses the
//! new one instead of fetching again. A fetch that fails is shared the same
//! way: tasks that queued behind it get its error rather than trying again.

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use url::Url;

/// A single entry of a JSON Web Key Set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus, base64url
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent, base64url
    #[serde(default)]
    pub e: Option<String>,
}

/// JSON Web Key Set document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Lookup of verification keys by `kid`
#[async_trait]
pub trait SigningKeys: Send + Sync {
    /// Key for `kid`, or [`AuthError::SigningKeyNotFound`] if there is none.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey>;
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
    generation: u64,
}

impl CachedKeys {
    fn from_set(set: JwkSet, generation: u64) -> Self {
        let mut keys = HashMap::new();
        for jwk in set.keys {
            let Some(kid) = jwk.kid else {
                tracing::debug!("skipping JWK without kid");
                continue;
            };
            if jwk.kty != "RSA" {
                tracing::debug!("skipping non-RSA JWK {} ({})", kid, jwk.kty);
                continue;
            }
            if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
                tracing::debug!("skipping JWK {} declared for {:?}", kid, jwk.alg);
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                tracing::warn!("RSA JWK {} is missing n or e", kid);
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => tracing::warn!("unusable RSA JWK {}: {}", kid, e),
            }
        }

        Self {
            keys,
            fetched_at: Instant::now(),
            generation,
        }
    }
}

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// `base * 2^attempt`, saturating at [`MAX_RETRY_DELAY`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

struct FetchFailure {
    retryable: bool,
    error: AuthError,
}

/// Process-wide cache of the provider's JWKS
pub struct JwksCache {
    http: reqwest::Client,
    jwks_uri: Url,
    refresh_interval: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    cached: RwLock<Option<Arc<CachedKeys>>>,
    /// Held for the whole of a fetch; carries the error of the last one if it failed.
    refresh_lock: tokio::sync::Mutex<Option<AuthError>>,
    /// Fetches finished so far, successful or not.
    completed_fetches: AtomicU64,
}

impl JwksCache {
    pub fn new(config: &AuthConfig, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            jwks_uri: config.jwks_uri()?,
            refresh_interval: config.jwks_refresh_interval,
            max_retries: config.jwks_max_retries,
            retry_backoff: config.jwks_retry_backoff,
            cached: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(None),
            completed_fetches: AtomicU64::new(0),
        })
    }

    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Key for `kid`, fetching or refreshing the set as needed.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey> {
        // Read before the snapshot so a fetch finishing in between is noticed.
        let seen_fetches = self.completed_fetches.load(Ordering::Acquire);
        let seen = self.snapshot();

        if let Some(cached) = &seen {
            if let Some(key) = cached.keys.get(kid) {
                if cached.fetched_at.elapsed() < self.refresh_interval {
                    tracing::debug!("JWKS cache hit for kid {}", kid);
                    return Ok(key.clone());
                }
                tracing::debug!("JWKS cache stale, refreshing");
            } else {
                tracing::debug!("kid {} not in cached JWKS, forcing refresh", kid);
            }
        } else {
            tracing::debug!("JWKS cache empty, fetching");
        }

        match self
            .refresh(seen.as_ref().map(|c| c.generation), seen_fetches)
            .await
        {
            Ok(cached) => cached
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| AuthError::SigningKeyNotFound(Some(kid.to_string()))),
            Err(error) => {
                // A failed refresh of a stale set still leaves a usable key.
                if let Some(key) = seen.and_then(|c| c.keys.get(kid).cloned()) {
                    tracing::warn!(
                        "JWKS refresh failed ({}), serving cached key {}",
                        error,
                        kid
                    );
                    return Ok(key);
                }
                Err(error)
            }
        }
    }

    /// Kids currently held in memory.
    pub fn cached_kids(&self) -> Vec<String> {
        self.snapshot()
            .map(|c| c.keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Option<Arc<CachedKeys>> {
        match self.cached.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, keys: Arc<CachedKeys>) {
        match self.cached.write() {
            Ok(mut guard) => *guard = Some(keys),
            Err(poisoned) => *poisoned.into_inner() = Some(keys),
        }
    }

    async fn refresh(
        &self,
        seen_generation: Option<u64>,
        seen_fetches: u64,
    ) -> Result<Arc<CachedKeys>> {
        let mut last_failure = self.refresh_lock.lock().await;

        let current = self.snapshot();
        if let Some(current) = &current {
            if Some(current.generation) != seen_generation {
                tracing::debug!("JWKS refreshed by another task");
                return Ok(current.clone());
            }
        }
        if self.completed_fetches.load(Ordering::Acquire) != seen_fetches {
            if let Some(error) = last_failure.as_ref() {
                tracing::debug!("JWKS fetch by another task failed, sharing its error");
                return Err(error.clone());
            }
        }

        let outcome = self.fetch_with_retry().await;
        self.completed_fetches.fetch_add(1, Ordering::Release);
        let set = match outcome {
            Ok(set) => {
                *last_failure = None;
                set
            }
            Err(error) => {
                *last_failure = Some(error.clone());
                return Err(error);
            }
        };
        let generation = current.map(|c| c.generation + 1).unwrap_or(1);
        let keys = Arc::new(CachedKeys::from_set(set, generation));
        tracing::debug!(
            "fetched JWKS generation {} with {} usable keys",
            generation,
            keys.keys.len()
        );
        self.store(keys.clone());
        Ok(keys)
    }

    async fn fetch_with_retry(&self) -> Result<JwkSet> {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(set) => return Ok(set),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    tracing::warn!(
                        "JWKS fetch failed ({}), retrying in {:?}",
                        failure.error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn fetch_once(&self) -> std::result::Result<JwkSet, FetchFailure> {
        let response = self
            .http
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(|e| FetchFailure {
                retryable: true,
                error: AuthError::JwksUnavailable(if e.is_timeout() {
                    "timeout".to_string()
                } else {
                    e.to_string()
                }),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure {
                retryable: status.is_server_error(),
                error: AuthError::JwksUnavailable(format!("HTTP {}", status.as_u16())),
            });
        }

        response.json::<JwkSet>().await.map_err(|e| FetchFailure {
            retryable: false,
            error: AuthError::JwksUnavailable(format!("invalid JWKS document: {}", e)),
        })
    }
}

#[async_trait]
impl SigningKeys for JwksCache {
    async fn key_for(&self, kid: &str) -> Result<DecodingKey> {
        self.get_key(kid).await
    }
}
