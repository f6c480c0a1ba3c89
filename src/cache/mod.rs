mod lru_cache;

pub use lru_cache::LRUCache;

pub trait Cache<K, V>: Sync + Send
where
    K: Sync + Send,
    V: Sync + Send + Clone,
{
    /// Inserts a mapping charged `charge` against the capacity and returns
    /// the value it replaces.
    fn insert(&self, key: K, value: V, charge: usize) -> Option<V>;
    fn get(&self, key: &K) -> Option<V>;
    fn total_charge(&self) -> usize;
}
