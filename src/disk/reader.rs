use super::format::{decode_block, BlockLayout};
use crate::IResult;
use std::io::Read;

/// Sequential reader of an on-disk run, one block in memory at a time.
pub struct BlockReader<R: Read> {
    inner: R,
    layout: BlockLayout,
    next_block: usize,
    keys: Vec<u64>,
    values: Vec<u64>,
    pos: usize,
    buf: Vec<u8>,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, layout: BlockLayout) -> IResult<Self> {
        let mut r = BlockReader {
            inner,
            layout,
            next_block: 0,
            keys: Vec::with_capacity(layout.entries_per_block * layout.width),
            values: Vec::with_capacity(layout.entries_per_block),
            pos: 0,
            buf: Vec::with_capacity(layout.block_bytes()),
        };
        r.fill()?;
        Ok(r)
    }

    fn fill(&mut self) -> IResult<()> {
        self.keys.clear();
        self.values.clear();
        self.pos = 0;
        let count = self.layout.block_entries(self.next_block);
        if count == 0 {
            return Ok(());
        }
        self.next_block += 1;
        self.buf.resize(count * self.layout.entry_bytes(), 0);
        self.inner.read_exact(&mut self.buf)?;
        decode_block(
            &self.buf,
            self.layout.width,
            count,
            &mut self.keys,
            &mut self.values,
        );
        Ok(())
    }

    /// The entry under the cursor, `None` once the run is exhausted.
    pub fn current(&self) -> Option<(&[u64], u64)> {
        if self.pos >= self.values.len() {
            return None;
        }
        let w = self.layout.width;
        Some((&self.keys[self.pos * w..(self.pos + 1) * w], self.values[self.pos]))
    }

    pub fn advance(&mut self) -> IResult<()> {
        if self.pos < self.values.len() {
            self.pos += 1;
        }
        if self.pos >= self.values.len() && self.next_block <= self.layout.blocks {
            self.fill()?;
        }
        Ok(())
    }
}
