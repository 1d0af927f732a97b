//! Process-wide cache instance.
//!
//! Optional convenience on top of an explicitly constructed [`SharedCache`].
//! Until `init` is called (or after `cleanup`) callers get `None` and should
//! compile on every call.

use parking_lot::RwLock;

use super::SharedCache;

static GLOBAL: RwLock<Option<SharedCache>> = parking_lot::const_rwlock(None);

/// Install a fresh global cache, replacing any previous one.
pub fn init(capacity: usize) -> SharedCache {
    let cache = SharedCache::new(capacity);
    let previous = GLOBAL.write().replace(cache.clone());
    if previous.is_some() {
        tracing::debug!(capacity, "replaced global expression cache");
    } else {
        tracing::debug!(capacity, "initialized global expression cache");
    }
    cache
}

pub fn get() -> Option<SharedCache> {
    GLOBAL.read().clone()
}

pub fn is_initialized() -> bool {
    GLOBAL.read().is_some()
}

/// Tear down the global cache, logging its final statistics.
pub fn cleanup() {
    let Some(cache) = GLOBAL.write().take() else { return };
    let stats = cache.stats();
    tracing::info!(
        entries = stats.entries,
        capacity = stats.capacity,
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        hit_rate = stats.hit_rate,
        "expression cache statistics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::compiler::compile;

    // The only test touching the global, so no ordering concerns.
    #[test]
    fn lifecycle() {
        cleanup();
        assert!(!is_initialized());
        assert!(get().is_none());

        let cache = init(8);
        assert!(is_initialized());
        let e = Expr::var("x");
        cache.insert(&e, compile(&e).unwrap());
        assert!(get().is_some_and(|g| g.ptr_eq(&cache) && g.lookup(&e).is_some()));

        let replaced = init(8);
        assert!(!replaced.ptr_eq(&cache));
        assert!(get().is_some_and(|g| g.lookup(&e).is_none()));

        cleanup();
        assert!(!is_initialized());
        cleanup();
    }
}
