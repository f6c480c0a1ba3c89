use bytes::{Buf, BufMut, BytesMut};
use std::mem::size_of;

/// Approximate size of every block in bytes, whatever the key width is.
pub const BLOCK_BYTES: usize = 100 << 10;

/// Maximum key width in words.
pub const MAX_WIDTH: usize = crate::domain::MAX_LABELS;

/// End of a disk range which is open to the right.
pub const SENTINEL: u32 = u32::MAX;

const WORD_BYTES: usize = size_of::<u64>();

const fn entries_table() -> [usize; MAX_WIDTH] {
    let mut t = [0; MAX_WIDTH];
    let mut i = 0;
    while i < MAX_WIDTH {
        // Key words plus the value word.
        t[i] = BLOCK_BYTES / (WORD_BYTES * (i + 2));
        i += 1;
    }
    t
}

/// Number of entries per block indexed by `width - 1`.
static ENTRIES_PER_BLOCK: [usize; MAX_WIDTH] = entries_table();

/// Returns the number of entries of a full block of `width`-word keys.
pub fn entries_per_block(width: usize) -> usize {
    assert!(
        (1..=MAX_WIDTH).contains(&width),
        "key width must be within [1, {}], but got {}",
        MAX_WIDTH,
        width
    );
    ENTRIES_PER_BLOCK[width - 1]
}

/// Half-open range of entry positions inside an on-disk run. `end` is
/// `SENTINEL` for a range which goes to the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskRange {
    pub start: u32,
    pub end: u32,
}

impl DiskRange {
    pub const FULL: DiskRange = DiskRange {
        start: 0,
        end: SENTINEL,
    };

    pub fn new(start: u32, end: u32) -> Self {
        DiskRange { start, end }
    }
}

/// Geometry of an on-disk run: `blocks` full blocks of `entries_per_block`
/// entries followed by a short block of `rem` entries.
///
/// ```text
///
///     +-------------------+-------------------+-----+--------------------+
///     | block 0           | block 1           | ... | remainder block    |
///     +-------------------+-------------------+-----+--------------------+
///
///     block:
///     +----------------------------------+------------------------+
///     | keys (entries * width u64, LE)   | values (entries u64, LE) |
///     +----------------------------------+------------------------+
///
/// ```
///
/// The file carries no header and no index, the layout is kept in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub width: usize,
    pub entries_per_block: usize,
    pub blocks: usize,
    pub rem: usize,
}

/// Contiguous part of a file covering blocks `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub first: usize,
    pub last: usize,
    pub offset: u64,
    pub entries: usize,
}

impl BlockLayout {
    pub fn new(width: usize, entries_per_block: usize) -> Self {
        assert!(entries_per_block > 0, "block must hold at least one entry");
        BlockLayout {
            width,
            entries_per_block,
            blocks: 0,
            rem: 0,
        }
    }

    /// Size in bytes of an encoded entry.
    #[inline]
    pub fn entry_bytes(&self) -> usize {
        WORD_BYTES * (self.width + 1)
    }

    /// Size in bytes of a full block.
    #[inline]
    pub fn block_bytes(&self) -> usize {
        self.entries_per_block * self.entry_bytes()
    }

    /// Total number of entries.
    pub fn entries(&self) -> usize {
        self.blocks * self.entries_per_block + self.rem
    }

    /// Total number of bytes of the run.
    pub fn file_size(&self) -> u64 {
        (self.entries() * self.entry_bytes()) as u64
    }

    /// Returns the blocks which cover entries `[range.start, range.end]`.
    /// The remainder block counts as block number `blocks`.
    pub fn span(&self, range: DiskRange) -> Option<BlockSpan> {
        let first = range.start as usize / self.entries_per_block;
        let last = if range.end == SENTINEL {
            self.blocks
        } else {
            range.end as usize / self.entries_per_block
        };

        let mut entries = 0;
        let mut cur = first;
        while cur < self.blocks && cur <= last {
            entries += self.entries_per_block;
            cur += 1;
        }
        if cur <= last && cur >= self.blocks && self.rem > 0 {
            entries += self.rem;
        }

        if entries == 0 {
            return None;
        }
        Some(BlockSpan {
            first,
            last: last.min(self.blocks),
            offset: (first * self.block_bytes()) as u64,
            entries,
        })
    }

    /// Number of entries of block `index`.
    pub fn block_entries(&self, index: usize) -> usize {
        if index < self.blocks {
            self.entries_per_block
        } else if index == self.blocks {
            self.rem
        } else {
            0
        }
    }
}

/// Appends one block to `dst`: all keys followed by all values.
pub fn encode_block(keys: &[u64], values: &[u64], dst: &mut BytesMut) {
    dst.reserve((keys.len() + values.len()) * WORD_BYTES);
    for k in keys {
        dst.put_u64_le(*k);
    }
    for v in values {
        dst.put_u64_le(*v);
    }
}

/// Decodes one block of `count` entries from the front of `src` and returns
/// the rest of it.
pub fn decode_block<'a>(
    mut src: &'a [u8],
    width: usize,
    count: usize,
    keys: &mut Vec<u64>,
    values: &mut Vec<u64>,
) -> &'a [u8] {
    assert!(
        src.len() >= count * WORD_BYTES * (width + 1),
        "block of {} entries doesn't fit {} bytes",
        count,
        src.len()
    );
    keys.reserve(count * width);
    for _ in 0..count * width {
        keys.push(src.get_u64_le());
    }
    values.reserve(count);
    for _ in 0..count {
        values.push(src.get_u64_le());
    }
    src
}
