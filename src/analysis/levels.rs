//! Level resolution and per-run memoization.

use std::collections::HashMap;
use tracing::debug;

/// Something that can tell the level of a login.
///
/// Implementations never fail: any transport or lookup problem is reported
/// as `None`, which the detector treats as "no statistical basis".
pub trait LevelResolver {
    fn resolve(&mut self, login: &str) -> Option<f64>;
}

impl<F> LevelResolver for F
where
    F: FnMut(&str) -> Option<f64>,
{
    fn resolve(&mut self, login: &str) -> Option<f64> {
        self(login)
    }
}

/// Fixed login → level table, e.g. loaded from a CSV file.
#[derive(Debug, Clone, Default)]
pub struct StaticLevels {
    levels: HashMap<String, f64>,
}

impl StaticLevels {
    pub fn new(levels: HashMap<String, f64>) -> Self {
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }
}

impl FromIterator<(String, f64)> for StaticLevels {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl LevelResolver for StaticLevels {
    fn resolve(&mut self, login: &str) -> Option<f64> {
        self.levels.get(login).copied()
    }
}

/// Memoizing front for a [`LevelResolver`].
///
/// Every answer is cached for the lifetime of the cache, unresolved ones
/// included, so each login hits the underlying resolver at most once.
pub struct LevelCache<R> {
    resolver: R,
    cache: HashMap<String, Option<f64>>,
    lookups: usize,
}

impl<R: LevelResolver> LevelCache<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    /// Level of `login`, resolving it on first use.
    pub fn resolve(&mut self, login: &str) -> Option<f64> {
        if let Some(level) = self.cache.get(login) {
            return *level;
        }

        let level = self.resolver.resolve(login);
        self.lookups += 1;
        match level {
            Some(value) => debug!("Level of {}: {:.2} (lookup {})", login, value, self.lookups),
            None => debug!("Level of {} could not be resolved (lookup {})", login, self.lookups),
        }
        self.cache.insert(login.to_string(), level);
        level
    }

    /// Seed the cache with an already known answer.
    #[cfg(test)]
    pub fn insert(&mut self, login: impl Into<String>, level: Option<f64>) {
        self.cache.insert(login.into(), level);
    }

    #[cfg(test)]
    pub fn contains(&self, login: &str) -> bool {
        self.cache.contains_key(login)
    }

    /// Number of calls made to the underlying resolver.
    #[cfg(test)]
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_memoizes_resolved_and_unresolved() {
        let mut calls = Vec::new();
        let mut cache = LevelCache::new(|login: &str| {
            calls.push(login.to_string());
            if login == "alice" {
                Some(3.0)
            } else {
                None
            }
        });

        assert_eq!(cache.resolve("alice"), Some(3.0));
        assert_eq!(cache.resolve("alice"), Some(3.0));
        assert_eq!(cache.resolve("ghost"), None);
        assert_eq!(cache.resolve("ghost"), None);
        assert_eq!(cache.lookups(), 2);
        drop(cache);

        assert_eq!(calls, vec!["alice".to_string(), "ghost".to_string()]);
    }

    #[test]
    fn test_contains_does_not_resolve() {
        let mut cache = LevelCache::new(StaticLevels::from_iter([("bob".to_string(), 4.5)]));

        assert!(!cache.contains("bob"));
        assert_eq!(cache.lookups(), 0);

        assert_eq!(cache.resolve("bob"), Some(4.5));
        assert!(cache.contains("bob"));
    }

    #[test]
    fn test_insert_seeds_cache() {
        let mut cache = LevelCache::new(StaticLevels::default());
        cache.insert("carol", Some(2.0));

        assert_eq!(cache.resolve("carol"), Some(2.0));
        assert_eq!(cache.lookups(), 0);
    }
}
