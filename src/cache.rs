use crate::{error::TransportError, query::QueryParams};
use dashmap::DashMap;
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use serde_json::Value;
use std::{fmt, future::Future};
use url::Url;

type SharedFetch = Shared<BoxFuture<'static, Result<Value, TransportError>>>;

/// Canonical identity of a request: the url followed by its serialized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &Url, params: &QueryParams) -> Self {
        let mut key = url.to_string();
        if !params.is_empty() {
            // string to string maps always serialize
            key.push_str(&serde_json::to_string(params).unwrap_or_default());
        }
        Self(key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    /// `false` only for the caller whose request actually went to the network.
    pub via_cache: bool,
}

/// Session-wide memoization of successful JSON responses.
///
/// Entries are never evicted: a key is derived from the exact request, so its
/// value can only be replaced by an equivalent one. Failed requests leave no
/// trace, and the next call for the same key goes to the network again.
/// Identical requests issued while one is still in flight share its result.
#[derive(Default)]
pub struct RequestCache {
    store: DashMap<CacheKey, Value>,
    inflight: DashMap<CacheKey, SharedFetch>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get<F, Fut>(
        &self,
        url: &Url,
        params: &QueryParams,
        fetch: F,
    ) -> Result<Fetched<Value>, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
    {
        self.get_if(url, params, fetch, |_| true).await
    }

    /// Same as [`get`](Self::get), but a successful value is stored only if
    /// `keep` accepts it. Rejected values are still shared with the callers
    /// that joined the request while it was in flight.
    pub async fn get_if<F, Fut, K>(
        &self,
        url: &Url,
        params: &QueryParams,
        fetch: F,
        keep: K,
    ) -> Result<Fetched<Value>, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, TransportError>> + Send + 'static,
        K: Fn(&Value) -> bool,
    {
        let key = CacheKey::new(url, params);

        let cached = self.store.get(&key).map(|entry| entry.value().clone());
        if let Some(value) = cached {
            // hits resolve on a later poll, like a network response would
            tokio::task::yield_now().await;
            tracing::debug!(key = %key, "request served from cache");
            return Ok(Fetched {
                value,
                via_cache: true,
            });
        }

        let (fetch, via_cache) = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), true),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let shared = fetch().boxed().shared();
                entry.insert(shared.clone());
                (shared, false)
            }
        };

        let result = fetch.clone().await;
        match &result {
            Ok(value) if keep(value) => {
                self.store.insert(key.clone(), value.clone());
            }
            Ok(_) => tracing::debug!(key = %key, "response not kept in cache"),
            Err(_) => {}
        }
        // a newer request for the same key may already be in flight
        self.inflight
            .remove_if(&key, |_, inflight| inflight.ptr_eq(&fetch));

        if let Err(err) = &result {
            tracing::warn!(key = %key, err = %err, "request failed, nothing cached");
        }
        result.map(|value| Fetched { value, via_cache })
    }

    pub fn contains(&self, url: &Url, params: &QueryParams) -> bool {
        self.store.contains_key(&CacheKey::new(url, params))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("entries", &self.store.len())
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn url() -> Url {
        Url::parse("http://localhost:27080/report/top_videos/_find").unwrap()
    }

    fn params(day: &str) -> QueryParams {
        QueryParams::from([("criteria".to_string(), format!(r#"{{"dt":"{day}"}}"#))])
    }

    struct CountingFetch {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingFetch {
        fn new(fail: bool) -> Self {
            Self {
                calls: Default::default(),
                fail,
            }
        }

        fn fetch(&self) -> impl Future<Output = Result<Value, TransportError>> + Send + 'static {
            let calls = self.calls.clone();
            let fail = self.fail;
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::task::yield_now().await;
                if fail {
                    Err(TransportError::Server("cursor not found".into()))
                } else {
                    Ok(json!({"results": [], "call": call}))
                }
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn key_is_url_followed_by_params() {
        let key = CacheKey::new(&url(), &params("2012-08-21"));
        assert_eq!(
            key.to_string(),
            r#"http://localhost:27080/report/top_videos/_find{"criteria":"{\"dt\":\"2012-08-21\"}"}"#
        );
        assert_eq!(
            CacheKey::new(&url(), &QueryParams::new()).to_string(),
            url().to_string()
        );
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let cache = RequestCache::new();
        let fetcher = CountingFetch::new(false);

        let first = cache
            .get(&url(), &params("2012-08-21"), || fetcher.fetch())
            .await
            .unwrap();
        let second = cache
            .get(&url(), &params("2012-08-21"), || fetcher.fetch())
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert!(!first.via_cache);
        assert!(second.via_cache);
        assert_eq!(first.value, second.value);
    }

    #[tokio::test]
    async fn cache_hit_does_not_resolve_synchronously() {
        let cache = RequestCache::new();
        let fetcher = CountingFetch::new(false);
        cache
            .get(&url(), &params("2012-08-21"), || fetcher.fetch())
            .await
            .unwrap();

        let (url, params) = (url(), params("2012-08-21"));
        let hit = cache.get(&url, &params, || fetcher.fetch());
        futures::pin_mut!(hit);
        assert!(futures::poll!(hit.as_mut()).is_pending());
        let hit = hit.await.unwrap();
        assert!(hit.via_cache);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn different_params_are_different_entries() {
        let cache = RequestCache::new();
        let fetcher = CountingFetch::new(false);
        for day in ["2012-08-21", "2012-08-22", "2012-08-21"] {
            cache.get(&url(), &params(day), || fetcher.fetch()).await.unwrap();
        }
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = RequestCache::new();
        let failing = CountingFetch::new(true);

        cache
            .get(&url(), &params("2012-08-21"), || failing.fetch())
            .await
            .expect_err("error expected");
        assert!(!cache.contains(&url(), &params("2012-08-21")));

        cache
            .get(&url(), &params("2012-08-21"), || failing.fetch())
            .await
            .expect_err("error expected");
        assert_eq!(failing.calls(), 2);

        let fetcher = CountingFetch::new(false);
        let fetched = cache
            .get(&url(), &params("2012-08-21"), || fetcher.fetch())
            .await
            .unwrap();
        assert!(!fetched.via_cache);
        assert!(cache.contains(&url(), &params("2012-08-21")));
    }

    #[tokio::test]
    async fn concurrent_requests_share_inflight_fetch() {
        let cache = RequestCache::new();
        let fetcher = CountingFetch::new(false);

        let (url_a, params_a) = (url(), params("2012-08-21"));
        let (url_b, params_b) = (url(), params("2012-08-21"));
        let (first, second) = futures::join!(
            cache.get(&url_a, &params_a, || fetcher.fetch()),
            cache.get(&url_b, &params_b, || fetcher.fetch()),
        );

        assert_eq!(fetcher.calls(), 1);
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.value, second.value);
        assert!(first.via_cache != second.via_cache);
    }

    #[tokio::test]
    async fn rejected_values_are_returned_but_not_kept() {
        let cache = RequestCache::new();
        let fetcher = CountingFetch::new(false);
        for _ in 0..2 {
            let fetched = cache
                .get_if(&url(), &params("2012-08-21"), || fetcher.fetch(), |_| false)
                .await
                .unwrap();
            assert!(!fetched.via_cache);
        }
        assert_eq!(fetcher.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn late_waiter_keeps_newer_inflight_request() {
        let cache = RequestCache::new();
        let (url, params) = (url(), params("2012-08-21"));
        let failing = CountingFetch::new(true);

        let mut leader = Box::pin(cache.get(&url, &params, || failing.fetch()));
        let mut joiner = Box::pin(cache.get(&url, &params, || failing.fetch()));
        assert!(futures::poll!(leader.as_mut()).is_pending());
        assert!(futures::poll!(joiner.as_mut()).is_pending());
        assert!(leader.await.is_err());

        // the failure is not cached, so the next caller starts a new request
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let retries = Arc::new(AtomicUsize::new(0));
        let mut retry = Box::pin(cache.get(&url, &params, {
            let retries = retries.clone();
            move || async move {
                retries.fetch_add(1, Ordering::SeqCst);
                let _ = released.await;
                Ok::<_, TransportError>(json!({"results": []}))
            }
        }));
        assert!(futures::poll!(retry.as_mut()).is_pending());

        // the joiner only now observes the old failure
        assert!(joiner.await.is_err());

        let fetcher = CountingFetch::new(false);
        let late = cache.get(&url, &params, || fetcher.fetch());
        release.send(()).unwrap();
        let (retry, late) = futures::join!(retry, late);
        assert!(!retry.unwrap().via_cache);
        assert!(late.unwrap().via_cache);
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(failing.calls(), 1);
    }
}
