use crate::error::Error;
use crate::util::reporter::{LogReporter, Reporter};
use crate::IResult;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What happens when a key which already exists is written again.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DuplicatePolicy {
    /// The latest value replaces the previous one.
    Overwrite,
    /// The latest value is bitwise OR-ed into the previous one.
    Combine,
}

impl DuplicatePolicy {
    #[inline]
    pub fn apply(self, old: u64, new: u64) -> u64 {
        match self {
            DuplicatePolicy::Overwrite => new,
            DuplicatePolicy::Combine => old | new,
        }
    }
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy::Overwrite
    }
}

#[derive(Clone)]
pub struct Options {
    /// Directory for on-disk runs. Without it the table never leaves memory.
    pub storage_path: Option<PathBuf>,
    /// Resident size in bytes above which the size monitor starts flushing
    /// buckets. Zero disables the monitor.
    pub resident_size_limit: usize,
    /// Policy for writes to a key which is already present.
    pub duplicates: DuplicatePolicy,
    /// Bloom filter density for on-disk runs. Zero disables the filter.
    pub bloom_bits_per_key: usize,
    /// Number of decoded block ranges each getter keeps. Zero disables the cache.
    pub block_cache_capacity: usize,
    /// When set, a getter groups requests for the same block range and
    /// serves the largest group once per tick.
    pub read_coalescing: Option<Duration>,
    /// Capacity of the request queue of each getter.
    pub request_queue_size: usize,
    /// Number of completion slots of each getter, i.e. the number of callers
    /// which may wait on one getter at the same time.
    pub completion_slots: usize,
    /// Observer of normalize, flush and read phases.
    pub reporter: Arc<dyn Reporter>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            storage_path: None,
            resident_size_limit: 0,
            duplicates: DuplicatePolicy::Overwrite,
            bloom_bits_per_key: 10,
            block_cache_capacity: 500,
            read_coalescing: None,
            request_queue_size: 1024,
            completion_slots: 128,
            reporter: Arc::new(LogReporter),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("storage_path", &self.storage_path)
            .field("resident_size_limit", &self.resident_size_limit)
            .field("duplicates", &self.duplicates)
            .field("bloom_bits_per_key", &self.bloom_bits_per_key)
            .field("block_cache_capacity", &self.block_cache_capacity)
            .field("read_coalescing", &self.read_coalescing)
            .field("request_queue_size", &self.request_queue_size)
            .field("completion_slots", &self.completion_slots)
            .finish()
    }
}

impl Options {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.resident_size_limit = limit;
        self
    }

    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub fn with_bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.bloom_bits_per_key = bits;
        self
    }

    pub fn with_block_cache_capacity(mut self, capacity: usize) -> Self {
        self.block_cache_capacity = capacity;
        self
    }

    pub fn with_read_coalescing(mut self, tick: Duration) -> Self {
        self.read_coalescing = Some(tick);
        self
    }

    pub fn with_completion_slots(mut self, slots: usize) -> Self {
        self.completion_slots = slots;
        self
    }

    pub fn with_request_queue_size(mut self, size: usize) -> Self {
        self.request_queue_size = size;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Checks the options for values a table can't work with.
    pub fn validate(&self) -> IResult<()> {
        if self.completion_slots == 0 {
            return Err(Error::Config("completion slots must be at least 1".to_owned()));
        }
        if self.request_queue_size == 0 {
            return Err(Error::Config("request queue size must be at least 1".to_owned()));
        }
        if self.bloom_bits_per_key > 64 {
            return Err(Error::Config(format!(
                "bloom filter density {} bits per key is too high",
                self.bloom_bits_per_key
            )));
        }
        if let Some(tick) = self.read_coalescing {
            if tick.is_zero() {
                return Err(Error::Config("read coalescing tick must be positive".to_owned()));
            }
        }
        Ok(())
    }
}
