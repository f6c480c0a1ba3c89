mod bloom;

pub use bloom::BloomFilter;

/// A filter summarizes the keys of an on-disk run so that most lookups of
/// absent keys are answered without touching the file.
pub trait FilterPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Returns an empty filter sized for `keys` keys.
    fn new_filter(&self, keys: usize) -> Vec<u8>;

    /// Adds `key` to a filter made by `new_filter`.
    fn add_key(&self, filter: &mut [u8], key: &[u64]);

    /// Returns false only if `key` was never added to `filter`.
    fn key_may_match(&self, filter: &[u8], key: &[u64]) -> bool;
}
