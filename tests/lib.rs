//! Shared helpers for the workspace integration tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use citytransit_core::{HttpClient, HttpError, HttpRequest, HttpResponse};

pub use citytransit_core::{
    CachePolicy, FetchError, MemoryStore, Source, SourceId, SourceRegistry, TransitService,
};

/// Transport answering from a URL map, with an optional fixed delay and
/// a hit counter. URLs without an entry fail like an unreachable host.
pub struct RecordingHttp {
    responses: Mutex<HashMap<String, String>>,
    delay: Duration,
    hits: AtomicUsize,
}

impl RecordingHttp {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            hits: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        self.responses
            .lock()
            .expect("response map lock")
            .insert(url.into(), body.into());
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Default for RecordingHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for RecordingHttp {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let body = self
                .responses
                .lock()
                .expect("response map lock")
                .get(&request.url)
                .cloned();
            match body {
                Some(body) => Ok(HttpResponse::ok_json(body)),
                None => Err(HttpError::new("connection refused")),
            }
        })
    }
}
