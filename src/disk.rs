//! On-disk block codec of runs.
mod format;
mod reader;
mod writer;

pub use format::{decode_block, entries_per_block, BlockLayout, DiskRange, MAX_WIDTH, SENTINEL};
pub use reader::BlockReader;
pub use writer::BlockWriter;
