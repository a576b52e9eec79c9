//! Cross-source entity resolution.
//!
//! Callers ask for entities by app-space id without knowing which city
//! network owns them. The resolver restores the raw id per candidate
//! source and hunts in priority order until one source produces a usable
//! payload: an explicit app prefix pins the first candidate, otherwise
//! the default source leads. Entities already tagged with a source skip
//! the hunt entirely via the known-source variant.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CachePolicy, TieredCache};
use crate::error::FetchError;
use crate::registry::{Source, SourceId, SourceRegistry};
use crate::resource::Resource;

/// A payload together with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub payload: Value,
    pub source_id: SourceId,
}

/// A result is usable when it is non-null and, for arrays, non-empty.
fn usable(payload: &Value) -> bool {
    match payload {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Hunts entities across the registered sources via the tiered cache.
#[derive(Clone)]
pub struct SourceResolver {
    registry: Arc<SourceRegistry>,
    cache: TieredCache,
}

impl SourceResolver {
    pub fn new(registry: Arc<SourceRegistry>, cache: TieredCache) -> Self {
        Self { registry, cache }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Try candidate sources in priority order until one answers.
    ///
    /// `build` turns each candidate source and its raw id into the
    /// resource to fetch.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] when every candidate was tried and none
    /// produced a usable payload; the last source error when every
    /// candidate failed outright.
    pub async fn resolve<F>(
        &self,
        app_id: &str,
        policy: CachePolicy,
        build: F,
    ) -> Result<Resolved, FetchError>
    where
        F: Fn(&Source, &str) -> Resource,
    {
        let candidates = self.registry.resolution_order(app_id);
        self.hunt(candidates, app_id, policy, &build).await
    }

    /// Skip the hunt when the caller already knows the owning source
    /// (the common path for entities tagged `_sourceId`). An invalid
    /// hint falls back to the full hunt.
    pub async fn resolve_known<F>(
        &self,
        hint: Option<&SourceId>,
        app_id: &str,
        policy: CachePolicy,
        build: F,
    ) -> Result<Resolved, FetchError>
    where
        F: Fn(&Source, &str) -> Resource,
    {
        if let Some(source) = hint.and_then(|id| self.registry.get(id)) {
            return self.hunt(vec![source], app_id, policy, &build).await;
        }
        let candidates = self.registry.resolution_order(app_id);
        self.hunt(candidates, app_id, policy, &build).await
    }

    async fn hunt<F>(
        &self,
        candidates: Vec<&Source>,
        app_id: &str,
        policy: CachePolicy,
        build: &F,
    ) -> Result<Resolved, FetchError>
    where
        F: Fn(&Source, &str) -> Resource,
    {
        let mut last_error = None;
        let mut saw_miss = false;

        for source in candidates {
            let raw_id = source.restore_upstream(app_id);
            let resource = build(source, &raw_id);

            match self.cache.get(source, &resource, policy).await {
                Ok(Some(payload)) if usable(&payload) => {
                    return Ok(Resolved {
                        payload,
                        source_id: source.id.clone(),
                    });
                }
                Ok(_) => {
                    debug!(app_id, source = %source.id, "source answered without usable data");
                    saw_miss = true;
                }
                // A 4xx means this source simply does not have the
                // entity; that is a miss, not a failure.
                Err(FetchError::Upstream { status }) if status < 500 => {
                    debug!(app_id, source = %source.id, status, "source does not know the id");
                    saw_miss = true;
                }
                Err(error) => {
                    debug!(app_id, source = %source.id, %error, "source failed, trying next");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if !saw_miss => Err(error),
            _ => Err(FetchError::NotFound {
                id: app_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
    use crate::queue::RequestQueue;
    use crate::snapshot::{NoSnapshots, SnapshotStore};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Transport answering from a URL map and recording request order.
    struct RoutedHttp {
        responses: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl RoutedHttp {
        fn new(responses: impl IntoIterator<Item = (String, String)>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().expect("request log lock").clone()
        }
    }

    impl HttpClient for RoutedHttp {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move {
                self.requested
                    .lock()
                    .expect("request log lock")
                    .push(request.url.clone());
                match self.responses.get(&request.url) {
                    Some(body) => Ok(HttpResponse::ok_json(body.clone())),
                    None => Ok(HttpResponse {
                        status: 404,
                        body: String::new(),
                    }),
                }
            })
        }
    }

    fn resolver_with(http: Arc<RoutedHttp>) -> SourceResolver {
        let registry = Arc::new(SourceRegistry::builtin());
        let snapshots = Arc::new(SnapshotStore::new(
            Arc::new(NoSnapshots),
            Arc::clone(&registry),
            "en",
        ));
        let cache = TieredCache::new(
            Arc::new(MemoryStore::new()),
            http,
            snapshots,
            RequestQueue::v3(),
        );
        SourceResolver::new(registry, cache)
    }

    fn details(source: &Source, raw_id: &str) -> Resource {
        let _ = source;
        Resource::RouteDetails {
            raw_route_id: raw_id.to_string(),
        }
    }

    fn harbor_url(raw_id: &str) -> String {
        format!(
            "https://api.harborcity-transit.net/v3/routes/{}",
            urlencoding::encode(raw_id)
        )
    }

    fn metro_url(raw_id: &str) -> String {
        format!(
            "https://api.metropolis-transit.net/v3/routes/{}",
            urlencoding::encode(raw_id)
        )
    }

    #[tokio::test]
    async fn explicit_prefix_pins_the_first_candidate() {
        let http = Arc::new(RoutedHttp::new(vec![(
            harbor_url("hbr:204"),
            json!({"id": "hbr:204"}).to_string(),
        )]));
        let resolver = resolver_with(Arc::clone(&http));

        let resolved = resolver
            .resolve("h:204", CachePolicy::Default, details)
            .await
            .expect("harbor answers");

        assert_eq!(resolved.source_id.as_str(), "harbor");
        assert_eq!(http.requested(), vec![harbor_url("hbr:204")]);
    }

    #[tokio::test]
    async fn unprefixed_ids_try_the_default_source_first() {
        let http = Arc::new(RoutedHttp::new(vec![(
            harbor_url("hbr:R7"),
            json!({"id": "hbr:R7"}).to_string(),
        )]));
        let resolver = resolver_with(Arc::clone(&http));

        let resolved = resolver
            .resolve("R7", CachePolicy::Default, details)
            .await
            .expect("harbor answers after the metro miss");

        assert_eq!(resolved.source_id.as_str(), "harbor");
        assert_eq!(
            http.requested(),
            vec![metro_url("mtr:R7"), harbor_url("hbr:R7")]
        );
    }

    #[tokio::test]
    async fn empty_arrays_do_not_count_as_answers() {
        let http = Arc::new(RoutedHttp::new(vec![
            (metro_url("mtr:R7"), String::from("[]")),
            (harbor_url("hbr:R7"), json!([{"id": "hbr:R7"}]).to_string()),
        ]));
        let resolver = resolver_with(Arc::clone(&http));

        let resolved = resolver
            .resolve("R7", CachePolicy::Default, details)
            .await
            .expect("non-empty array wins");

        assert_eq!(resolved.source_id.as_str(), "harbor");
    }

    #[tokio::test]
    async fn exhausted_candidates_fail_with_not_found() {
        let http = Arc::new(RoutedHttp::new(Vec::new()));
        let resolver = resolver_with(http);

        let error = resolver
            .resolve("R404", CachePolicy::Default, details)
            .await
            .expect_err("no source answers");

        assert_eq!(
            error,
            FetchError::NotFound {
                id: String::from("R404")
            }
        );
    }

    #[tokio::test]
    async fn known_source_hint_skips_the_hunt() {
        let http = Arc::new(RoutedHttp::new(vec![(
            harbor_url("hbr:204"),
            json!({"id": "hbr:204"}).to_string(),
        )]));
        let resolver = resolver_with(Arc::clone(&http));

        let hint = SourceId::new("harbor");
        let resolved = resolver
            .resolve_known(Some(&hint), "h:204", CachePolicy::Default, details)
            .await
            .expect("hinted source answers");

        assert_eq!(resolved.source_id.as_str(), "harbor");
        assert_eq!(http.requested(), vec![harbor_url("hbr:204")]);
    }

    #[tokio::test]
    async fn invalid_hint_falls_back_to_the_full_hunt() {
        let http = Arc::new(RoutedHttp::new(vec![(
            metro_url("mtr:R7"),
            json!({"id": "mtr:R7"}).to_string(),
        )]));
        let resolver = resolver_with(Arc::clone(&http));

        let hint = SourceId::new("ghost");
        let resolved = resolver
            .resolve_known(Some(&hint), "R7", CachePolicy::Default, details)
            .await
            .expect("hunt answers");

        assert_eq!(resolved.source_id.as_str(), "metro");
    }
}
