use super::format::{encode_block, BlockLayout};
use crate::filter::FilterPolicy;
use crate::IResult;
use bytes::BytesMut;
use std::io::Write;
use std::sync::Arc;

/// Streams sorted entries into fixed size blocks.
///
/// Entries are buffered until a block is full. `finish` writes the short
/// remainder block and returns the layout needed to read the run back.
pub struct BlockWriter<W: Write> {
    inner: W,
    layout: BlockLayout,
    keys: Vec<u64>,
    values: Vec<u64>,
    buf: BytesMut,
    filter: Option<(Arc<dyn FilterPolicy>, Vec<u8>)>,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(inner: W, width: usize, entries_per_block: usize) -> Self {
        let layout = BlockLayout::new(width, entries_per_block);
        BlockWriter {
            inner,
            layout,
            keys: Vec::with_capacity(entries_per_block * width),
            values: Vec::with_capacity(entries_per_block),
            buf: BytesMut::with_capacity(layout.block_bytes()),
            filter: None,
        }
    }

    /// Builds a filter of every written key, sized for `expected` keys.
    pub fn with_filter(mut self, policy: Arc<dyn FilterPolicy>, expected: usize) -> Self {
        let data = policy.new_filter(expected);
        self.filter = Some((policy, data));
        self
    }

    pub fn put(&mut self, key: &[u64], value: u64) -> IResult<()> {
        debug_assert_eq!(key.len(), self.layout.width);
        if let Some((policy, data)) = &mut self.filter {
            policy.add_key(data, key);
        }
        self.keys.extend_from_slice(key);
        self.values.push(value);
        if self.values.len() == self.layout.entries_per_block {
            self.write_block()?;
            self.layout.blocks += 1;
        }
        Ok(())
    }

    fn write_block(&mut self) -> IResult<()> {
        self.buf.clear();
        encode_block(&self.keys, &self.values, &mut self.buf);
        self.inner.write_all(&self.buf)?;
        self.keys.clear();
        self.values.clear();
        Ok(())
    }

    /// Writes the remainder block and flushes the underlying writer.
    pub fn finish(mut self) -> IResult<(W, BlockLayout, Option<Vec<u8>>)> {
        if !self.values.is_empty() {
            self.layout.rem = self.values.len();
            self.write_block()?;
        }
        self.inner.flush()?;
        Ok((self.inner, self.layout, self.filter.map(|(_, data)| data)))
    }
}
