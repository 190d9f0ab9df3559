use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Entrada de caché con TTL
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Caché concurrente con expiración por tiempo.
///
/// Clonar la caché comparte el mismo almacenamiento.
#[derive(Debug)]
pub struct TtlCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.data
            .insert(key, CacheEntry::new(value))
            .map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entry = self.data.get(key)?;
            if !entry.is_expired(self.ttl) {
                return Some(entry.value.clone());
            }
        }

        // Solo se elimina si sigue expirada: otra tarea pudo reinsertarla.
        self.data.remove_if(key, |_, entry| entry.is_expired(self.ttl));
        None
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.insert("a".into(), 1), None);
        assert_eq!(cache.insert("a".into(), 2), Some(1));
        assert_eq!(cache.get(&"a".to_string()), Some(2));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::ZERO);
        cache.insert("a".into(), 1);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 0);

        cache.insert("b".into(), 2);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expired_lookup_keeps_fresh_reinsert() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(20));
        let key = "a".to_string();
        cache.insert(key.clone(), 1);
        std::thread::sleep(Duration::from_millis(30));

        // Reemplazo fresco antes de la lectura: no debe borrarse.
        cache.insert(key.clone(), 2);
        assert_eq!(cache.get(&key), Some(2));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        let other = cache.clone();
        other.insert("shared".into(), 7);
        assert_eq!(cache.get(&"shared".to_string()), Some(7));
    }
}
