//! The locked registries tracking seen and exposed configurations.
//!
//! Both registries share one lock-protected map abstraction; they differ
//! only in key choice. `seen` holds everything any source currently
//! provides (keyed per source and composite key, so a file- and a
//! dyncfg-sourced record under the same name coexist). `exposed` holds at
//! most one record per composite key, the one currently advertised.

use dashmap::DashMap;
use scout_core::types::{ConfigStatus, SourceKind};

/// What the caches need to know about a config record.
pub trait CacheKeyed {
    /// Composite key `type:name`.
    fn composite_key(&self) -> String;
    /// Origin identifier (file path or command source string).
    fn source(&self) -> &str;
    /// Origin kind.
    fn source_kind(&self) -> SourceKind;
    /// Record-level unique id, distinguishing records that share a key.
    fn uid(&self) -> &str;
}

/// Lock-protected map with no partial-write visibility. Absence is the
/// `Option` result; there are no errors.
struct LockedCache<V> {
    map: DashMap<String, V>,
}

impl<V: Clone> LockedCache<V> {
    fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    fn insert(&self, key: String, value: V) {
        self.map.insert(key, value);
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.map.remove(key).map(|(_, v)| v)
    }

    fn get(&self, key: &str) -> Option<V> {
        self.map.get(key).map(|e| e.value().clone())
    }

    fn count(&self) -> usize {
        self.map.len()
    }

    fn collect_if<F: Fn(&V) -> bool>(&self, pred: F) -> Vec<V> {
        self.map
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    fn update<F: FnOnce(&mut V)>(&self, key: &str, f: F) -> bool {
        match self.map.get_mut(key) {
            Some(mut e) => {
                f(e.value_mut());
                true
            }
            None => false,
        }
    }
}

/// Everything ever provided by a currently present source.
pub struct SeenCache<C> {
    cache: LockedCache<C>,
}

impl<C: CacheKeyed + Clone> SeenCache<C> {
    pub fn new() -> Self {
        Self {
            cache: LockedCache::new(),
        }
    }

    fn key_of(cfg: &C) -> String {
        format!("{}|{}", cfg.source(), cfg.composite_key())
    }

    pub fn add(&self, cfg: C) {
        self.cache.insert(Self::key_of(&cfg), cfg);
    }

    pub fn remove(&self, cfg: &C) {
        self.cache.remove(&Self::key_of(cfg));
    }

    /// All records provided by `source`.
    pub fn lookup_by_source(&self, source: &str) -> Vec<C> {
        self.cache.collect_if(|c| c.source() == source)
    }

    pub fn count(&self) -> usize {
        self.cache.count()
    }
}

impl<C: CacheKeyed + Clone> Default for SeenCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// An exposed record with its lifecycle status.
#[derive(Debug, Clone)]
pub struct ExposedEntry<C> {
    pub cfg: C,
    pub status: ConfigStatus,
}

/// The single advertised record per composite key.
pub struct ExposedCache<C> {
    cache: LockedCache<ExposedEntry<C>>,
}

impl<C: CacheKeyed + Clone> ExposedCache<C> {
    pub fn new() -> Self {
        Self {
            cache: LockedCache::new(),
        }
    }

    /// Inserting under an already exposed key replaces the previous entry,
    /// preserving the at-most-one-per-key invariant by construction.
    pub fn add(&self, entry: ExposedEntry<C>) {
        self.cache.insert(entry.cfg.composite_key(), entry);
    }

    pub fn lookup(&self, composite_key: &str) -> Option<ExposedEntry<C>> {
        self.cache.get(composite_key)
    }

    pub fn remove(&self, composite_key: &str) -> Option<ExposedEntry<C>> {
        self.cache.remove(composite_key)
    }

    /// Updates the status of an exposed entry in place.
    pub fn set_status(&self, composite_key: &str, status: ConfigStatus) -> bool {
        self.cache.update(composite_key, |e| e.status = status)
    }

    pub fn count(&self) -> usize {
        self.cache.count()
    }

    /// Exposed configs of one discoverer type (the composite-key prefix).
    pub fn count_by_type(&self, kind: &str) -> usize {
        let prefix = format!("{kind}:");
        self.cache
            .collect_if(|e| e.cfg.composite_key().starts_with(&prefix))
            .len()
    }

    pub fn entries(&self) -> Vec<ExposedEntry<C>> {
        self.cache.collect_if(|_| true)
    }
}

impl<C: CacheKeyed + Clone> Default for ExposedCache<C> {
    fn default() -> Self {
        Self::new()
    }
}
