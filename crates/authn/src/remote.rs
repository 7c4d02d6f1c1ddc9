//! Keystore backed by a remote JSON Web Key Set endpoint.
//!
//! [`RemoteJwksKeystore`] fetches a key set over HTTPS on first use and
//! caches it, so token verification does not hit the network on every call.
//!
//! # Architecture
//!
//! ```text
//! choose_pubkey(kid) → cached key set?
//!                    → miss: one GET per miss (concurrent callers wait on it)
//!                    → keep keys with a kid and use = "sig" (or no use)
//!                    → look up kid
//! ```
//!
//! # Cache Strategy
//!
//! - **Lifetime**: by default a fetched set is kept for the life of the keystore
//! - **TTL**: [`RemoteJwksConfig::cache_ttl`] bounds how long a set is reused
//! - **Explicit refresh**: [`RemoteJwksKeystore::refresh`] drops the set and re-fetches
//! - **Background refresh**: [`RemoteJwksKeystore::with_refresh_interval`] re-fetches periodically
//!
//! Failed fetches are not cached and are not retried here; the next lookup
//! tries again.
//!
//! # Examples
//!
//! ```no_run
//! use portal_common_authn::{RemoteJwksConfig, RemoteJwksKeystore, Token};
//!
//! # async fn example(compact: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RemoteJwksConfig::builder().url("https://auth.example.com/jwks").build();
//! let keystore = RemoteJwksKeystore::new(config)?;
//!
//! let mut token = Token::new();
//! let claims = token.verify(&keystore, Some("staff"), Some(compact), false).await?;
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use fail::fail_point;
use moka::future::Cache;
use parking_lot::Mutex;
use portal_common_keystore::{Jwk, JwkSet, Keystore, KeystoreError, KeystoreResult};
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::config::RemoteJwksConfig;

/// Keystore that resolves verification keys from a remote key set.
///
/// The remote set holds public keys only, so
/// [`choose_secret`](Keystore::choose_secret) always returns `None`.
pub struct RemoteJwksKeystore {
    config: RemoteJwksConfig,
    client: reqwest::Client,
    /// Holds at most one entry, keyed by the endpoint URL.
    cache: Cache<String, Arc<JwkSet>>,
    /// Number of HTTP fetches started.
    fetch_count: AtomicU64,
    /// Cancellation token for stopping the background refresh task.
    cancel_token: CancellationToken,
    /// Handle for the background refresh task, if running.
    refresh_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl fmt::Debug for RemoteJwksKeystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteJwksKeystore")
            .field("config", &self.config)
            .field("fetch_count", &self.fetch_count())
            .finish_non_exhaustive()
    }
}

impl RemoteJwksKeystore {
    /// Creates a keystore for the configured endpoint. Nothing is fetched
    /// until the first lookup.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::KeySetFetch`] if the URL cannot be parsed,
    /// uses plain `http` without [`allow_http`](RemoteJwksConfig::allow_http),
    /// or the HTTP client cannot be built.
    pub fn new(config: RemoteJwksConfig) -> KeystoreResult<Self> {
        let url = Url::parse(&config.url).map_err(|e| {
            KeystoreError::key_set_fetch_with_source(format!("invalid key set url {}", config.url), e)
        })?;
        match url.scheme() {
            "https" => {},
            "http" if config.allow_http => {
                tracing::warn!(url = %config.url, "fetching key set over plain http");
            },
            scheme => {
                return Err(KeystoreError::key_set_fetch(format!(
                    "refusing to fetch key set over '{scheme}': https required for {}",
                    config.url
                )));
            },
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| KeystoreError::key_set_fetch_with_source("failed to build HTTP client", e))?;

        let mut builder = Cache::builder().max_capacity(16);
        if let Some(ttl) = config.cache_ttl {
            builder = builder.time_to_live(ttl);
        }

        Ok(Self {
            config,
            client,
            cache: builder.build(),
            fetch_count: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        })
    }

    /// Creates a shared keystore and, if
    /// [`refresh_interval`](RemoteJwksConfig::refresh_interval) is set, starts
    /// the background refresh task.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context when a refresh interval
    /// is configured.
    pub fn start(config: RemoteJwksConfig) -> KeystoreResult<Arc<Self>> {
        let interval = config.refresh_interval;
        let keystore = Arc::new(Self::new(config)?);
        Ok(match interval {
            Some(interval) => keystore.with_refresh_interval(interval),
            None => keystore,
        })
    }

    /// The configuration this keystore was built from.
    #[must_use]
    pub fn config(&self) -> &RemoteJwksConfig {
        &self.config
    }

    /// Number of usable signing keys in the remote set.
    ///
    /// # Errors
    ///
    /// Returns an error if the set has to be fetched and the fetch fails.
    pub async fn count(&self) -> KeystoreResult<usize> {
        Ok(self.key_set().await?.len())
    }

    /// Returns the signing key with the given `kid`.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::KeyNotFound`] if the set has no such key, or
    /// the fetch error if the set could not be loaded.
    #[tracing::instrument(skip(self))]
    pub async fn by_kid(&self, kid: &str) -> KeystoreResult<Jwk> {
        self.key_set().await?.find(kid).cloned().ok_or_else(|| KeystoreError::key_not_found(kid))
    }

    /// Drops the cached set and fetches it again. Returns the number of
    /// usable signing keys in the new set.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. The cache stays empty in that case.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> KeystoreResult<usize> {
        self.cache.invalidate(&self.config.url).await;
        let result = self.count().await;
        tracing::info!(
            audit.action = "refresh_key_set",
            audit.resource = %self.config.url,
            audit.result = if result.is_ok() { "success" } else { "failure" },
            "audit_event"
        );
        result
    }

    /// Number of HTTP fetches started so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Returns the cancellation token for the background refresh task.
    ///
    /// Callers can use this to integrate with external shutdown signals.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Starts a background task that re-fetches the key set every `interval`.
    ///
    /// The task holds only a weak reference; it stops when
    /// [`shutdown`](Self::shutdown) is called or the last `Arc` is dropped.
    /// Fetch errors are logged and the previous set is kept until its TTL
    /// runs out.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_refresh_interval(self: Arc<Self>, interval: Duration) -> Arc<Self> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        let token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("background key set refresh shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(keystore) = weak.upgrade() else { break };
                        keystore.refresh_cycle().await;
                    }
                }
            }
        });

        *self.refresh_handle.lock() = Some(handle);
        self
    }

    /// Stops the background refresh task and drops the cached set.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "background refresh task panicked");
        }
        self.cache.invalidate_all();
    }

    async fn refresh_cycle(&self) {
        let start = Instant::now();
        let fresh = self.fetch().await;
        match fresh {
            Ok(set) => {
                let keys = set.len();
                self.cache.insert(self.config.url.clone(), set).await;
                tracing::info!(
                    keys,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "background key set refresh complete"
                );
            },
            Err(err) => {
                tracing::warn!(url = %self.config.url, error = %err, "background key set refresh failed");
            },
        }
    }

    /// Returns the cached key set, fetching it if absent. Concurrent callers
    /// share one fetch.
    async fn key_set(&self) -> KeystoreResult<Arc<JwkSet>> {
        self.cache
            .try_get_with(self.config.url.clone(), self.fetch())
            .await
            .map_err(|err: Arc<KeystoreError>| (*err).clone())
    }

    #[tracing::instrument(skip(self), fields(url = %self.config.url))]
    async fn fetch(&self) -> KeystoreResult<Arc<JwkSet>> {
        fail_point!("remote-jwks-before-fetch", |_| {
            Err(KeystoreError::key_set_fetch("injected failure before key set fetch"))
        });
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let url = &self.config.url;
        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| KeystoreError::key_set_fetch_with_source(format!("GET {url} failed"), e))?;
            let body = response.text().await.map_err(|e| {
                KeystoreError::key_set_fetch_with_source(format!("reading key set from {url} failed"), e)
            })?;
            JwkSet::from_json(&body)
        };

        let set = tokio::time::timeout(self.config.timeout, request)
            .await
            .map_err(|_| KeystoreError::key_set_fetch_timeout(url.clone(), self.config.timeout))??;

        let signing = set.signing_keys();
        if signing.is_empty() {
            return Err(KeystoreError::key_set_fetch(format!("no signing keys in key set at {url}")));
        }
        tracing::debug!(keys = signing.len(), "fetched key set");
        Ok(Arc::new(JwkSet::new(signing)))
    }
}

impl Drop for RemoteJwksKeystore {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl Keystore for RemoteJwksKeystore {
    #[tracing::instrument(skip(self))]
    async fn choose_pubkey(&self, kid: &str) -> KeystoreResult<Option<Jwk>> {
        match self.by_kid(kid).await {
            Ok(key) => Ok(Some(key.to_public())),
            Err(KeystoreError::KeyNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn choose_secret(
        &self,
        _kid: Option<&str>,
        _randomly: bool,
    ) -> KeystoreResult<Option<Jwk>> {
        Ok(None)
    }
}
