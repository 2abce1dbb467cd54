use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use aliri::{
    jwk::{KeyId, KeyIdRef},
    Jwk, Jwks,
};
use arc_swap::ArcSwap;
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::ALGORITHM;

/// Indicates that no signing key could be found for a token
#[derive(Debug, Error)]
pub enum KeyResolutionError {
    /// No key in the key set, even after a refresh, carries the requested key ID
    #[error("no signing key matches key ID '{kid}'")]
    UnknownKeyId {
        /// The key ID named by the token
        kid: KeyId,
    },
    /// The key set could not be retrieved from the remote source
    #[error("unable to fetch JWKS")]
    Fetch(#[from] reqwest::Error),
}

#[derive(Debug)]
struct VolatileData {
    jwks: Jwks,
    generation: u64,
    fetched_at: Option<Instant>,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl VolatileData {
    fn new(jwks: Jwks, generation: u64) -> Self {
        Self {
            jwks,
            generation,
            fetched_at: None,
            etag: None,
            last_modified: None,
        }
    }

    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        match (self.fetched_at, max_age) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(max_age)) => at.elapsed() < max_age,
        }
    }

    fn find(&self, kid: &KeyIdRef) -> Option<Jwk> {
        self.jwks.get_key_by_id(kid, ALGORITHM).cloned()
    }
}

#[derive(Debug)]
struct RemoteOptions {
    jwks_url: String,
    client: Client,
    max_age: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    data: ArcSwap<VolatileData>,
    remote: Option<RemoteOptions>,
    refresh_lock: Mutex<()>,
}

/// Resolves signing keys by key ID from a JSON Web Key Set (JWKS)
///
/// A resolver backed by a remote JWKS fetches the set lazily, on the first
/// resolution, and fetches it again whenever a token names a key ID that is
/// not in the cached set or when the cached set is older than its maximum age.
/// Concurrent refreshes are coalesced so that a burst of tokens signed with a
/// newly rotated key causes a single fetch. A failed fetch leaves the cached
/// set in place.
///
/// Cloning a resolver is cheap; clones share the same cache.
#[derive(Debug, Clone)]
#[must_use]
pub struct KeyResolver {
    inner: Arc<Inner>,
}

impl KeyResolver {
    /// Constructs a resolver over a fixed key set
    ///
    /// Such a resolver never performs network calls. A key ID that is not in
    /// the set is immediately reported as unknown.
    pub fn new(jwks: Jwks) -> Self {
        Self::with_data(VolatileData::new(jwks, 0), None)
    }

    /// Constructs a resolver that fetches its key set from a URL
    ///
    /// Nothing is fetched until the first key is requested. When `max_age`
    /// is set, a cached key set older than that is fetched again before use.
    pub fn from_url(jwks_url: impl Into<String>, client: Client, max_age: Option<Duration>) -> Self {
        let remote = RemoteOptions {
            jwks_url: jwks_url.into(),
            client,
            max_age,
        };

        Self::with_data(VolatileData::new(Jwks::default(), 0), Some(remote))
    }

    fn with_data(data: VolatileData, remote: Option<RemoteOptions>) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(data),
                remote,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    /// The URL of the remote key set, if any
    #[must_use]
    pub fn jwks_url(&self) -> Option<&str> {
        self.inner.remote.as_ref().map(|r| r.jwks_url.as_str())
    }

    /// Replaces the cached key set
    pub fn set_jwks(&self, jwks: Jwks) {
        let generation = self.inner.data.load().generation + 1;
        let mut data = VolatileData::new(jwks, generation);
        data.fetched_at = Some(Instant::now());
        self.inner.data.store(Arc::new(data));
    }

    /// Finds the RS256 verification key with the given key ID
    ///
    /// # Errors
    ///
    /// Returns an error if the key set could not be fetched or if no key
    /// matches, even after fetching a fresh copy of the key set.
    #[tracing::instrument(level = "debug", skip_all, fields(jwt.kid = %kid))]
    pub async fn resolve(&self, kid: &KeyIdRef) -> Result<Jwk, KeyResolutionError> {
        let observed = self.inner.data.load_full();

        let remote = match &self.inner.remote {
            Some(remote) => remote,
            None => return observed.find(kid).ok_or_else(|| unknown_key(kid)),
        };

        if observed.is_fresh(remote.max_age) {
            if let Some(key) = observed.find(kid) {
                return Ok(key);
            }
            tracing::debug!("key ID not in cached JWKS; refreshing");
        } else {
            tracing::debug!("cached JWKS is missing or stale; refreshing");
        }

        {
            let _guard = self.inner.refresh_lock.lock().await;
            let current = self.inner.data.load_full();
            if current.generation == observed.generation {
                self.fetch(remote, &current).await?;
            } else {
                tracing::debug!("JWKS already refreshed by a concurrent request");
            }
        }

        self.inner
            .data
            .load()
            .find(kid)
            .ok_or_else(|| unknown_key(kid))
    }

    /// Fetches the key set from the remote URL
    ///
    /// No retries are attempted. If the attempt to refresh the JWKS from
    /// the remote URL fails, no change is made to the cached JWKS. A resolver
    /// over a fixed key set does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not a JWKS.
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh(&self) -> Result<(), reqwest::Error> {
        if let Some(remote) = &self.inner.remote {
            tracing::Span::current().record("jwks.url", remote.jwks_url.as_str());
            let _guard = self.inner.refresh_lock.lock().await;
            let current = self.inner.data.load_full();
            self.fetch(remote, &current).await?;
        }

        Ok(())
    }

    /// Spawns a task that refreshes the key set on a fixed interval
    ///
    /// Failures are logged and otherwise ignored; the next tick tries again.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_refresh(&self, interval: Duration) {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                let _ = this.refresh().await;
            }
        });
    }

    async fn fetch(
        &self,
        remote: &RemoteOptions,
        current: &VolatileData,
    ) -> Result<(), reqwest::Error> {
        tracing::debug!(jwks.url = %remote.jwks_url, "fetching JWKS");
        let mut request = remote.client.get(&remote.jwks_url);

        if let Some(etag) = &current.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        } else if let Some(last_modified) = &current.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, jwks.url = %remote.jwks_url, "JWKS fetch failed");
                return Err(err);
            }
        };

        if response.status() == StatusCode::NOT_MODIFIED {
            let data = VolatileData {
                jwks: current.jwks.clone(),
                generation: current.generation + 1,
                fetched_at: Some(Instant::now()),
                etag: current.etag.clone(),
                last_modified: current.last_modified.clone(),
            };
            self.inner.data.store(Arc::new(data));
            tracing::debug!("JWKS not modified");
            return Ok(());
        } else if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                jwks.url = %remote.jwks_url,
                "JWKS fetch failed; unexpected response status",
            );
            return Err(err);
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);

        match response.json::<Jwks>().await {
            Ok(jwks) => {
                let keys = jwks.keys().len();
                let data = VolatileData {
                    jwks,
                    generation: current.generation + 1,
                    fetched_at: Some(Instant::now()),
                    etag,
                    last_modified,
                };
                self.inner.data.store(Arc::new(data));
                tracing::info!(jwks.url = %remote.jwks_url, jwks.keys = keys, "JWKS refreshed");
                Ok(())
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, jwks.url = %remote.jwks_url, "JWKS fetch failed; unreadable key set");
                Err(err)
            }
        }
    }
}

fn unknown_key(kid: &KeyIdRef) -> KeyResolutionError {
    tracing::debug!(%kid, alg = %ALGORITHM, "unable to find matching key");
    KeyResolutionError::UnknownKeyId {
        kid: kid.to_owned(),
    }
}
