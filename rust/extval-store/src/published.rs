use std::{sync::Arc, time::SystemTime};

use arc_swap::ArcSwapOption;

use crate::{provider::ValuesProvider, settings::KeyType};

/// The slot holding the currently published provider of a field.
///
/// Written by the refresh cycle of the field only, read by any number of
/// threads without locking. A reader that loaded a provider keeps it (and its
/// memory mapping) alive until it drops it, regardless of later publishes.
#[derive(Default)]
pub struct PublishedValues {
    slot: ArcSwapOption<ValuesProvider>,
}

impl PublishedValues {
    pub fn new() -> PublishedValues {
        Default::default()
    }

    pub fn load(&self) -> Option<Arc<ValuesProvider>> {
        self.slot.load_full()
    }

    pub fn is_available(&self) -> bool {
        self.slot.load().is_some()
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        match &*self.slot.load() {
            Some(provider) => Some(provider.last_modified()),
            None => None,
        }
    }

    /// Replaces the published provider in a single atomic store.
    pub fn publish(&self, provider: Arc<ValuesProvider>) {
        self.slot.store(Some(provider));
    }

    #[inline]
    pub fn get(&self, key: i64, default: f64) -> f64 {
        match &*self.slot.load() {
            Some(provider) => provider.get(key, default),
            None => default,
        }
    }
}

impl std::fmt::Debug for PublishedValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedValues")
            .field("provider", &self.load())
            .finish()
    }
}

/// Lookup handle of an external map, handed out to query code.
///
/// Cheap to clone. Always reads the latest published provider.
#[derive(Debug, Clone)]
pub struct ExternalFileValues {
    published: Arc<PublishedValues>,
    key_type: KeyType,
}

impl ExternalFileValues {
    pub fn new(published: Arc<PublishedValues>, key_type: KeyType) -> ExternalFileValues {
        ExternalFileValues {
            published,
            key_type,
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Returns the value of `key`, or `default` when no values are published
    /// yet, the key is absent, or it does not fit the key type.
    #[inline]
    pub fn get(&self, key: i64, default: f64) -> f64 {
        if !self.key_type.accepts(key) {
            return default;
        }
        self.published.get(key, default)
    }

    /// The current provider, for callers doing many lookups against one
    /// generation.
    pub fn snapshot(&self) -> Option<Arc<ValuesProvider>> {
        self.published.load()
    }

    pub fn is_available(&self) -> bool {
        self.published.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ParsedValues;

    fn provider(pairs: &[(i64, f64)], secs: u64) -> Arc<ValuesProvider> {
        let mut parsed = ParsedValues::default();
        for &(key, value) in pairs {
            parsed.push(key, value);
        }
        let modified = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs);
        Arc::new(ValuesProvider::in_memory(&parsed, None, modified).unwrap())
    }

    #[test]
    fn test_empty_slot_returns_default() {
        let published = PublishedValues::new();
        assert!(!published.is_available());
        assert_eq!(None, published.last_modified());
        assert_eq!(-1.0, published.get(1, -1.0));
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let published = Arc::new(PublishedValues::new());
        let values = ExternalFileValues::new(published.clone(), KeyType::Long);

        published.publish(provider(&[(1, 1.0)], 10));
        let first = values.snapshot().unwrap();
        assert_eq!(1.0, values.get(1, f64::NAN));

        published.publish(provider(&[(1, 2.0)], 20));
        assert_eq!(2.0, values.get(1, f64::NAN));
        assert_eq!(
            Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(20)),
            published.last_modified()
        );
        // A retired snapshot stays usable.
        assert_eq!(1.0, first.get(1, f64::NAN));
    }

    #[test]
    fn test_int_key_type_rejects_wide_keys() {
        let published = Arc::new(PublishedValues::new());
        let wide = 1i64 << 40;
        published.publish(provider(&[(wide, 5.0)], 10));
        assert_eq!(
            0.0,
            ExternalFileValues::new(published.clone(), KeyType::Int).get(wide, 0.0)
        );
        assert_eq!(
            5.0,
            ExternalFileValues::new(published, KeyType::Long).get(wide, 0.0)
        );
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let published = Arc::new(PublishedValues::new());
        let keys = (0..1000i64).collect::<Vec<_>>();
        published.publish(provider(
            &keys.iter().map(|&k| (k, 0.0)).collect::<Vec<_>>(),
            0,
        ));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let published = published.clone();
                let keys = &keys;
                scope.spawn(move || {
                    for _ in 0..200 {
                        let snapshot = published.load().unwrap();
                        let first = snapshot.get(0, f64::NAN);
                        assert!(keys.iter().all(|&k| snapshot.get(k, f64::NAN) == first));
                    }
                });
            }
            for generation in 1..100 {
                let pairs = keys
                    .iter()
                    .map(|&k| (k, generation as f64))
                    .collect::<Vec<_>>();
                published.publish(provider(&pairs, generation));
            }
        });
    }
}
