use super::Run;
use crate::disk::{BlockReader, BlockWriter, SENTINEL};
use crate::error::Error;
use crate::opt::DuplicatePolicy;
use crate::IResult;
use std::cmp::Ordering;
use std::io::{Read, Write};

/// Output position of the next entry, failing once it can't be told apart
/// from `SENTINEL`.
fn position(width: usize, written: usize) -> IResult<u32> {
    if written >= SENTINEL as usize {
        return Err(Error::RunOverflow(width));
    }
    Ok(written as u32)
}

impl Run {
    /// Writes the whole sorted run and returns the markers of its entries.
    pub fn write_all<W: Write>(&self, writer: &mut BlockWriter<W>) -> IResult<Vec<u32>> {
        self.check();
        let mut markers = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            markers.push(position(self.width, i)?);
            writer.put(self.key(i), self.values[i])?;
        }
        Ok(markers)
    }

    /// Merges the sorted run with the previous on-disk run into `writer`.
    ///
    /// Returns the markers and the values of the resident entries in the new
    /// on-disk run. A resident entry supersedes an on-disk entry of the same
    /// key, or is combined with it under `DuplicatePolicy::Combine`.
    pub fn merge<R: Read, W: Write>(
        &self,
        reader: &mut BlockReader<R>,
        writer: &mut BlockWriter<W>,
        policy: DuplicatePolicy,
    ) -> IResult<(Vec<u32>, Vec<u64>)> {
        self.check();
        let n = self.len();
        let mut markers = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut i = 0;
        let mut written = 0;
        loop {
            let advance_disk = match (i < n, reader.current()) {
                (false, None) => break,
                (false, Some((key, value))) => {
                    writer.put(key, value)?;
                    true
                }
                (true, None) => {
                    markers.push(position(self.width, written)?);
                    values.push(self.values[i]);
                    writer.put(self.key(i), self.values[i])?;
                    i += 1;
                    false
                }
                (true, Some((key, value))) => match self.key(i).cmp(key) {
                    Ordering::Greater => {
                        writer.put(key, value)?;
                        true
                    }
                    ord => {
                        let v = if ord == Ordering::Equal {
                            policy.apply(value, self.values[i])
                        } else {
                            self.values[i]
                        };
                        markers.push(position(self.width, written)?);
                        values.push(v);
                        writer.put(self.key(i), v)?;
                        i += 1;
                        ord == Ordering::Equal
                    }
                },
            };
            written += 1;
            if advance_disk {
                reader.advance()?;
            }
        }
        Ok((markers, values))
    }
}
