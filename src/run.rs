//! Columnar in-memory segment of a bucket.
//!
//! Keys of one run share the same width, so they are kept in one flat
//! array with a stride of `width` words next to a parallel array of values.
//! Once a run has been flushed it also carries one marker per entry: the
//! position of the entry inside the on-disk run, or `NO_MARKER` for
//! entries which only live in memory.
use crate::disk::{decode_block, DiskRange, SENTINEL};
use crate::opt::DuplicatePolicy;
use crate::util::reporter::Reporter;
use std::cmp::Ordering;

mod merge;

/// Marker of an entry which isn't on disk.
pub const NO_MARKER: u32 = u32::MAX;

/// Result of looking a key up in a ready run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The key is resident. `range` is set when the entry has never been
    /// written to disk while the run has, it bounds where an older value of
    /// the key may live.
    Resident {
        value: u64,
        range: Option<DiskRange>,
    },
    /// The key isn't resident, but it may be on disk within the range.
    Disk(DiskRange),
    /// The key is nowhere.
    Absent,
}

#[derive(Debug, Clone, Default)]
pub struct Run {
    width: usize,
    keys: Vec<u64>,
    values: Vec<u64>,
    markers: Option<Vec<u32>>,
}

impl Run {
    pub fn new(width: usize) -> Self {
        Self::with_capacity(width, 0)
    }

    pub fn with_capacity(width: usize, entries: usize) -> Self {
        assert!(width > 0, "zero width run");
        Run {
            width,
            keys: Vec::with_capacity(entries * width),
            values: Vec::with_capacity(entries),
            markers: None,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn key(&self, i: usize) -> &[u64] {
        &self.keys[i * self.width..(i + 1) * self.width]
    }

    pub fn marker(&self, i: usize) -> u32 {
        self.markers.as_ref().map_or(NO_MARKER, |m| m[i])
    }

    /// Resident size in bytes.
    pub fn size(&self) -> usize {
        (self.keys.len() + self.values.len()) * 8
    }

    /// Number of bytes `drop90` would release.
    pub fn size90(&self) -> usize {
        self.len() * 90 / 100 * 8 * (self.width + 1)
    }

    fn check(&self) {
        assert_eq!(
            self.keys.len(),
            self.values.len() * self.width,
            "corrupted run of width {}: {} key words for {} values",
            self.width,
            self.keys.len(),
            self.values.len()
        );
        if let Some(m) = &self.markers {
            assert_eq!(
                m.len(),
                self.values.len(),
                "corrupted run of width {}: {} markers for {} values",
                self.width,
                m.len(),
                self.values.len()
            );
        }
    }

    fn check_key(&self, key: &[u64]) {
        assert_eq!(
            key.len(),
            self.width,
            "key of {} words doesn't fit run of width {}",
            key.len(),
            self.width
        );
    }

    /// Appends an entry without keeping the run sorted.
    pub fn append(&mut self, key: &[u64], value: u64) {
        self.check_key(key);
        self.keys.extend_from_slice(key);
        self.values.push(value);
        if let Some(m) = &mut self.markers {
            m.push(NO_MARKER);
        }
    }

    /// Inserts an entry into a sorted run, keeping it sorted. An existing
    /// entry keeps its marker and gets its value updated per `policy`.
    pub fn inplace_insert(&mut self, key: &[u64], value: u64, policy: DuplicatePolicy) {
        self.check_key(key);
        match self.search(key) {
            Ok(i) => self.values[i] = policy.apply(self.values[i], value),
            Err(i) => {
                let at = i * self.width;
                self.keys.splice(at..at, key.iter().copied());
                self.values.insert(i, value);
                if let Some(m) = &mut self.markers {
                    m.insert(i, NO_MARKER);
                }
            }
        }
    }

    /// Binary search of a sorted run. Returns the position of `key` or the
    /// position where it would be inserted.
    pub fn search(&self, key: &[u64]) -> Result<usize, usize> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Returns the resident value of `key` in a sorted run.
    pub fn find(&self, key: &[u64]) -> Option<u64> {
        self.search(key).ok().map(|i| self.values[i])
    }

    /// Sorts the run by key and collapses equal keys. Entries of equal keys
    /// are combined in insertion order, the result takes the marker of the
    /// latest one.
    pub fn normalize(&mut self, reporter: &dyn Reporter, policy: DuplicatePolicy) {
        self.check();
        let n = self.len();
        reporter.normalize_started(self.width, n);

        let mut order: Vec<usize> = (0..n).collect();
        reporter.normalize_sorting(self.width, n);
        // `sort_by` is stable, so equal keys stay in insertion order.
        order.sort_by(|&a, &b| self.key(a).cmp(self.key(b)));

        let mut keys = Vec::with_capacity(self.keys.len());
        let mut values: Vec<u64> = Vec::with_capacity(n);
        let mut markers = self.markers.as_ref().map(|_| Vec::with_capacity(n));
        for i in order {
            let key = self.key(i);
            let last = values.len();
            if last > 0 && &keys[(last - 1) * self.width..] == key {
                values[last - 1] = policy.apply(values[last - 1], self.values[i]);
                if let Some(m) = &mut markers {
                    m[last - 1] = self.marker(i);
                }
                continue;
            }
            keys.extend_from_slice(key);
            values.push(self.values[i]);
            if let Some(m) = &mut markers {
                m.push(self.marker(i));
            }
        }

        self.keys = keys;
        self.values = values;
        self.markers = markers;
        reporter.normalize_finished(self.width, self.len());
    }

    /// Looks `key` up in a sorted run.
    pub fn lookup(&self, key: &[u64]) -> Lookup {
        self.check_key(key);
        match self.search(key) {
            Ok(i) => {
                let range = match &self.markers {
                    Some(m) if m[i] == NO_MARKER => self.disk_range(i),
                    _ => None,
                };
                Lookup::Resident {
                    value: self.values[i],
                    range,
                }
            }
            Err(i) => match self.disk_range(i) {
                Some(range) => Lookup::Disk(range),
                None => Lookup::Absent,
            },
        }
    }

    /// Returns the disk range bounded by the nearest entries with a marker
    /// around position `pos`, or `None` if no key there can be on disk.
    ///
    /// A run without markers was never flushed. A range ending at position 0
    /// lies below the first entry of the file, which always stays resident.
    fn disk_range(&self, pos: usize) -> Option<DiskRange> {
        let markers = self.markers.as_ref()?;
        let start = markers[..pos]
            .iter()
            .rev()
            .find(|&&m| m != NO_MARKER)
            .copied()
            .unwrap_or(0);
        let end = markers[pos..]
            .iter()
            .find(|&&m| m != NO_MARKER)
            .copied()
            .unwrap_or(SENTINEL);
        if end == 0 {
            return None;
        }
        Some(DiskRange::new(start, end))
    }

    /// Replaces the markers with the positions of the entries in a freshly
    /// written on-disk run.
    pub fn set_markers(&mut self, markers: Vec<u32>) {
        assert_eq!(markers.len(), self.len(), "marker count mismatch");
        self.markers = Some(markers);
    }

    /// Replaces the values, used to commit the values combined by a merge.
    pub fn set_values(&mut self, values: Vec<u64>) {
        assert_eq!(values.len(), self.len(), "value count mismatch");
        self.values = values;
    }

    /// Keeps every tenth entry of a flushed run. The remaining entries keep
    /// their markers and serve as fence pointers for the on-disk run.
    pub fn drop90(&mut self) {
        let markers = match &self.markers {
            Some(m) => m,
            None => panic!("dropping entries of a run of width {} which is not on disk", self.width),
        };
        let n = (self.len() + 9) / 10;
        let mut keys = Vec::with_capacity(n * self.width);
        let mut values = Vec::with_capacity(n);
        let mut kept = Vec::with_capacity(n);
        for i in (0..self.len()).step_by(10) {
            keys.extend_from_slice(self.key(i));
            values.push(self.values[i]);
            kept.push(markers[i]);
        }
        self.keys = keys;
        self.values = values;
        self.markers = Some(kept);
    }

    /// Appends `count` entries decoded from the front of `src` and returns
    /// the rest of it.
    pub fn extend_from_block<'a>(&mut self, src: &'a [u8], count: usize) -> &'a [u8] {
        decode_block(src, self.width, count, &mut self.keys, &mut self.values)
    }
}
