//! Tiered request cache.
//!
//! Wraps one upstream call with a freshness policy, in-flight
//! de-duplication, detached background revalidation, and a fallback race
//! against the bundled snapshot index. The cache keeps read paths
//! answering when the upstream is slow, erroring, or unreachable: a
//! network failure is never surfaced to the caller while any fallback
//! exists for the request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::freshness::Freshness;
use crate::http::{HttpClient, HttpRequest};
use crate::queue::RequestQueue;
use crate::registry::Source;
use crate::resource::{ApiVersion, Resource};
use crate::retry::RetryConfig;
use crate::snapshot::SnapshotStore;
use crate::store::{CacheRecord, DurableStore};

/// Durable store keys are the request URL under this prefix.
pub const CACHE_KEY_PREFIX: &str = "cache_";

/// How long a fallback-covered request waits for the network before the
/// fallback answers instead.
pub const FALLBACK_TIMER: Duration = Duration::from_millis(600);

/// The shorter race timer used by cache-first reads.
pub const CACHE_FIRST_FALLBACK_TIMER: Duration = Duration::from_millis(100);

/// Read strategy for one cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Cache by freshness tier, then network, racing any fallback.
    #[default]
    Default,
    /// Prefer any cached payload, race the fallback on a short timer and
    /// spend at most one retry on the network.
    CacheFirst,
    /// Never touch the network: cached payload of any age, else snapshot.
    CacheOnly,
    /// Skip the cache read and the fallback race; pure revalidation.
    NetworkOnly,
}

type NetOutcome = Result<Value, FetchError>;

struct CacheShared {
    store: Arc<dyn DurableStore>,
    http: Arc<dyn HttpClient>,
    snapshots: Arc<SnapshotStore>,
    queue: RequestQueue,
    offline: AtomicBool,
    inflight: Mutex<HashMap<String, watch::Receiver<Option<NetOutcome>>>>,
}

/// Tiered request cache over the durable store, the snapshot index, and
/// one HTTP transport. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TieredCache {
    shared: Arc<CacheShared>,
}

impl TieredCache {
    pub fn new(
        store: Arc<dyn DurableStore>,
        http: Arc<dyn HttpClient>,
        snapshots: Arc<SnapshotStore>,
        queue: RequestQueue,
    ) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                store,
                http,
                snapshots,
                queue,
                offline: AtomicBool::new(false),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether the device is known to be offline. Offline reads get no
    /// retries and fail over to their fallback immediately on error.
    pub fn offline(&self) -> bool {
        self.shared.offline.load(Ordering::Relaxed)
    }

    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::Relaxed);
    }

    /// Fetch one resource from one source under a cache policy.
    ///
    /// `Ok(None)` means "no data": the request had no usable cache, no
    /// network result, and its fallback missed — callers treat this as
    /// an empty answer, not a failure.
    pub async fn get(
        &self,
        source: &Source,
        resource: &Resource,
        policy: CachePolicy,
    ) -> Result<Option<Value>, FetchError> {
        let url = resource.url(source);
        let key = format!("{CACHE_KEY_PREFIX}{url}");

        let record = if policy == CachePolicy::NetworkOnly {
            None
        } else {
            match self.shared.store.get(&key).await {
                Ok(record) => record,
                Err(error) => {
                    warn!(%error, url, "durable store read failed, treating as cache miss");
                    None
                }
            }
        };

        let mut expired_payload = None;
        if let Some(record) = record {
            match record.freshness() {
                Freshness::Fresh => return Ok(Some(record.payload)),
                Freshness::Stale => {
                    if policy != CachePolicy::CacheOnly {
                        // Detached revalidation; errors are swallowed and
                        // the in-flight map keeps it to one per URL.
                        let _ = self.subscribe(source, resource, &url, &key, RetryConfig::no_retry());
                    }
                    return Ok(Some(record.payload));
                }
                Freshness::Expired => expired_payload = Some(record.payload),
            }
        }

        if policy == CachePolicy::CacheOnly {
            if expired_payload.is_some() {
                return Ok(expired_payload);
            }
            return Ok(self.shared.snapshots.fallback(source, resource).await);
        }

        let retry = RetryConfig::for_policy(policy, self.offline());
        let mut rx = self.subscribe(source, resource, &url, &key, retry);

        let fallback = if policy == CachePolicy::NetworkOnly {
            None
        } else {
            let cached = if policy == CachePolicy::CacheFirst {
                expired_payload.take()
            } else {
                None
            };
            match cached {
                Some(value) => Some(value),
                None if resource.snapshot_covered() => {
                    self.shared.snapshots.fallback(source, resource).await
                }
                None => None,
            }
        };

        match fallback {
            Some(fallback) => {
                let timer = if policy == CachePolicy::CacheFirst {
                    CACHE_FIRST_FALLBACK_TIMER
                } else {
                    FALLBACK_TIMER
                };
                tokio::select! {
                    outcome = await_outcome(&mut rx) => match outcome {
                        Ok(value) => Ok(Some(value)),
                        Err(error) => {
                            debug!(%error, url, "network failed, serving fallback");
                            Ok(Some(fallback))
                        }
                    },
                    _ = tokio::time::sleep(timer) => Ok(Some(fallback)),
                }
            }
            None => await_outcome(&mut rx).await.map(Some),
        }
    }

    /// Join the in-flight request for `url`, starting one when none is
    /// running. The network task is detached: a caller abandoning the
    /// race never cancels it, so its cache write still lands and warms
    /// the next read.
    fn subscribe(
        &self,
        source: &Source,
        resource: &Resource,
        url: &str,
        key: &str,
        retry: RetryConfig,
    ) -> watch::Receiver<Option<NetOutcome>> {
        let mut inflight = self
            .shared
            .inflight
            .lock()
            .expect("in-flight map lock is not poisoned");
        if let Some(rx) = inflight.get(url) {
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(url.to_string(), rx.clone());

        let shared = Arc::clone(&self.shared);
        let url = url.to_string();
        let key = key.to_string();
        let api_version = resource.api_version();
        let api_key = source.api_key.clone();
        tokio::spawn(async move {
            let outcome =
                fetch_network(&shared, &url, &key, api_version, api_key.as_deref(), retry).await;
            shared
                .inflight
                .lock()
                .expect("in-flight map lock is not poisoned")
                .remove(&url);
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}

/// One network attempt sequence with retries; persists a fresh cache
/// record on success. V3-generation calls run under the bounded queue.
async fn fetch_network(
    shared: &CacheShared,
    url: &str,
    key: &str,
    api_version: ApiVersion,
    api_key: Option<&str>,
    retry: RetryConfig,
) -> NetOutcome {
    let offline = shared.offline.load(Ordering::Relaxed);
    let mut attempt: u32 = 0;

    loop {
        let request = HttpRequest::get(url).with_api_key(api_key);
        let result = match api_version {
            ApiVersion::V3 => shared.queue.run(shared.http.execute(request)).await,
            ApiVersion::V2 => shared.http.execute(request).await,
        };

        let error = match result {
            Ok(response) if response.is_success() => {
                let value = match serde_json::from_str::<Value>(&response.body) {
                    Ok(value) => value,
                    Err(error) => return Err(FetchError::decode(error)),
                };
                if let Err(error) = shared.store.set(key, CacheRecord::new(value.clone())).await {
                    warn!(%error, url, "durable store write failed");
                }
                return Ok(value);
            }
            Ok(response) if response.is_server_error() => FetchError::Upstream {
                status: response.status,
            },
            Ok(response) => {
                return Err(FetchError::Upstream {
                    status: response.status,
                })
            }
            Err(error) => {
                if offline {
                    FetchError::Offline
                } else {
                    FetchError::Network(error.to_string())
                }
            }
        };

        if attempt >= retry.max_retries {
            return Err(error);
        }
        debug!(url, attempt, %error, "upstream attempt failed, retrying");
        tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
        attempt += 1;
    }
}

async fn await_outcome(rx: &mut watch::Receiver<Option<NetOutcome>>) -> NetOutcome {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return Err(FetchError::Network(String::from("request task terminated")));
        }
    }
}
