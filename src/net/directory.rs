//! Member directory client with short-lived response caches.
//!
//! DESIGN
//! ======
//! Directory pages are browsed back and forth, so searches, single profiles
//! and the recommendation list are cached for a few minutes. Caching is
//! opt-in per call: profile pages that must be fresh pass `use_cache = false`
//! and neither read nor fill the cache.
//!
//! TRADE-OFFS
//! ==========
//! Entries are only evicted by explicit `clear*` calls or replaced on the
//! next cached fetch; stale entries are cheap and the key space is small.

#[cfg(test)]
#[path = "directory_test.rs"]
mod directory_test;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use tracing::debug;

use super::api::{ApiError, HttpApi, decode, rejection};
use super::types::{Member, Page};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

const SEARCH_PATH: &str = "/directory/search/";
const RECOMMENDED_PATH: &str = "/directory/recommended/";

fn directory_member_path(member_id: i64) -> String {
    format!("/directory/{member_id}/")
}

// =============================================================================
// DIRECTORY TRAIT
// =============================================================================

/// Uncached directory endpoints. Enables mocking in tests.
#[async_trait::async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn search_members(&self, query: &str, page: u32, page_size: u32) -> Result<Page<Member>, ApiError>;
    async fn recommended_members(&self) -> Result<Vec<Member>, ApiError>;
    async fn member_by_id(&self, member_id: i64) -> Result<Member, ApiError>;
}

#[async_trait::async_trait]
impl DirectoryApi for HttpApi {
    async fn search_members(&self, query: &str, page: u32, page_size: u32) -> Result<Page<Member>, ApiError> {
        let builder = self.request(Method::GET, SEARCH_PATH).await.query(&[
            ("q", query.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ]);
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        decode(&body)
    }

    async fn recommended_members(&self) -> Result<Vec<Member>, ApiError> {
        self.get_json(RECOMMENDED_PATH).await
    }

    async fn member_by_id(&self, member_id: i64) -> Result<Member, ApiError> {
        self.get_json(&directory_member_path(member_id)).await
    }
}

// =============================================================================
// TTL CACHE
// =============================================================================

struct Cached<V> {
    value: V,
    stored_at: Instant,
}

/// Map whose entries stay readable for `ttl` after insertion.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Cached<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Internal: lookup with explicit timestamp (for testing).
    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let cached = self.entries.get(key)?;
        (now.saturating_duration_since(cached.stored_at) <= self.ttl).then(|| cached.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(key, Cached { value, stored_at: now });
    }

    pub fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// CACHED DIRECTORY
// =============================================================================

/// Identity of one search results page.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub query: String,
    pub page: u32,
    pub page_size: u32,
}

/// Directory client that optionally serves repeated lookups from memory.
pub struct Directory {
    api: Arc<dyn DirectoryApi>,
    searches: Mutex<TtlCache<SearchKey, Page<Member>>>,
    profiles: Mutex<TtlCache<i64, Member>>,
    recommended: Mutex<TtlCache<(), Vec<Member>>>,
}

impl Directory {
    #[must_use]
    pub fn new(api: Arc<dyn DirectoryApi>, ttl: Duration) -> Self {
        Self {
            api,
            searches: Mutex::new(TtlCache::new(ttl)),
            profiles: Mutex::new(TtlCache::new(ttl)),
            recommended: Mutex::new(TtlCache::new(ttl)),
        }
    }

    /// Search members by name.
    ///
    /// # Errors
    ///
    /// Propagates the [`ApiError`] of an uncached fetch.
    pub async fn search_members(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
        use_cache: bool,
    ) -> Result<Page<Member>, ApiError> {
        let key = SearchKey { query: query.to_string(), page, page_size };
        if use_cache {
            if let Some(hit) = lock(&self.searches).get(&key) {
                debug!(query, page, page_size, "using cached search results");
                return Ok(hit);
            }
        }

        let results = self.api.search_members(query, page, page_size).await?;
        if use_cache {
            lock(&self.searches).insert(key, results.clone());
        }
        Ok(results)
    }

    /// Members the backend recommends to the caller.
    ///
    /// # Errors
    ///
    /// Propagates the [`ApiError`] of an uncached fetch.
    pub async fn recommended_members(&self, use_cache: bool) -> Result<Vec<Member>, ApiError> {
        if use_cache {
            if let Some(hit) = lock(&self.recommended).get(&()) {
                debug!("using cached recommended members");
                return Ok(hit);
            }
        }

        let members = self.api.recommended_members().await?;
        if use_cache {
            lock(&self.recommended).insert((), members.clone());
        }
        Ok(members)
    }

    /// A single directory profile.
    ///
    /// # Errors
    ///
    /// Propagates the [`ApiError`] of an uncached fetch.
    pub async fn member_by_id(&self, member_id: i64, use_cache: bool) -> Result<Member, ApiError> {
        if use_cache {
            if let Some(hit) = lock(&self.profiles).get(&member_id) {
                debug!(member_id, "using cached member profile");
                return Ok(hit);
            }
        }

        let member = self.api.member_by_id(member_id).await?;
        if use_cache {
            lock(&self.profiles).insert(member_id, member.clone());
        }
        Ok(member)
    }

    /// Drop cached searches and profiles. The recommendation list is kept.
    pub fn clear(&self) {
        lock(&self.searches).clear();
        lock(&self.profiles).clear();
    }

    pub fn clear_search(&self, key: &SearchKey) {
        lock(&self.searches).remove(key);
    }

    pub fn clear_profile(&self, member_id: i64) {
        lock(&self.profiles).remove(&member_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
