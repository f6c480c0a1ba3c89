//! Observational hooks for the expensive phases of a table: normalizing a
//! bucket, flushing it to disk and reading blocks back.
//!
//! Every method has an empty default so implementations override only what
//! they care about. Reporters must never influence the outcome of an
//! operation.
use log::{debug, info};

pub trait Reporter: Send + Sync {
    /// A dirty bucket of `width`-word keys holding `len` entries is about to
    /// be normalized.
    fn normalize_started(&self, _width: usize, _len: usize) {}

    /// Sorting of the bucket starts.
    fn normalize_sorting(&self, _width: usize, _len: usize) {}

    /// Normalization finished, `len` entries are left after deduplication.
    fn normalize_finished(&self, _width: usize, _len: usize) {}

    /// A bucket with `from` resident entries is flushed and expected to keep
    /// about `to` of them.
    fn flush_started(&self, _width: usize, _from: usize, _to: usize) {}

    /// Flush finished, `to` entries stay resident.
    fn flush_finished(&self, _width: usize, _from: usize, _to: usize) {}

    /// A getter worker reads blocks `[from, to]` to serve `requests` callers
    /// while `queued` request groups keep waiting.
    fn disk_read(&self, _width: usize, _from: usize, _to: usize, _requests: usize, _queued: usize) {}
}

/// Reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Reporter that routes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn normalize_started(&self, width: usize, len: usize) {
        debug!("normalizing {} subarray with {} domains", width, len);
    }

    fn normalize_sorting(&self, width: usize, len: usize) {
        debug!("sorting {} subarray with {} domains", width, len);
    }

    fn normalize_finished(&self, width: usize, len: usize) {
        debug!("normalized {} subarray with {} domains", width, len);
    }

    fn flush_started(&self, width: usize, from: usize, to: usize) {
        info!("flushing {} subarray ({} -> {})", width, from, to);
    }

    fn flush_finished(&self, width: usize, from: usize, to: usize) {
        info!("flushed {} subarray ({} -> {})", width, from, to);
    }

    fn disk_read(&self, width: usize, from: usize, to: usize, requests: usize, queued: usize) {
        debug!(
            "reading blocks [{}, {}] of {} subarray for {} requests ({} groups queued)",
            from, to, width, requests, queued
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every event, used by tests across the crate.
    #[derive(Default)]
    pub(crate) struct RecordingReporter {
        pub(crate) events: Mutex<Vec<(&'static str, usize, usize)>>,
        pub(crate) reads: Mutex<Vec<(usize, usize)>>,
    }

    impl RecordingReporter {
        pub(crate) fn count(&self, name: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _, _)| *n == name)
                .count()
        }
    }

    impl Reporter for RecordingReporter {
        fn normalize_started(&self, width: usize, len: usize) {
            self.events.lock().unwrap().push(("normalize", width, len));
        }

        fn normalize_finished(&self, width: usize, len: usize) {
            self.events.lock().unwrap().push(("normalized", width, len));
        }

        fn flush_started(&self, width: usize, from: usize, _to: usize) {
            self.events.lock().unwrap().push(("flush", width, from));
        }

        fn flush_finished(&self, width: usize, _from: usize, to: usize) {
            self.events.lock().unwrap().push(("flushed", width, to));
        }

        fn disk_read(&self, _width: usize, _from: usize, _to: usize, requests: usize, queued: usize) {
            self.reads.lock().unwrap().push((requests, queued));
        }
    }

    #[test]
    fn test_noop_reporter_accepts_events() {
        let r = NoopReporter;
        r.normalize_started(1, 2);
        r.flush_finished(1, 2, 3);
        r.disk_read(1, 0, 1, 1, 0);
    }

    #[test]
    fn test_recording_reporter_counts() {
        let r = RecordingReporter::default();
        r.flush_started(3, 20, 2);
        r.flush_finished(3, 20, 2);
        r.flush_started(2, 10, 1);
        assert_eq!(2, r.count("flush"));
        assert_eq!(1, r.count("flushed"));
        assert_eq!(0, r.count("normalize"));
    }
}
