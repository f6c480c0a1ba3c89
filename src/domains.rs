//! One length class of a table: a run of resident entries plus the getter
//! of the on-disk run holding everything flushed before.
use crate::disk::{BlockReader, BlockWriter};
use crate::getter::{Getter, KeyFilter};
use crate::opt::DuplicatePolicy;
use crate::run::{Lookup, Run};
use crate::storage::{remove_if_exists, File, FileStorage, Storage};
use crate::table::Context;
use crate::IResult;
use log::warn;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

/// Removes a file on drop unless disarmed.
struct TempFile {
    path: Option<PathBuf>,
}

impl TempFile {
    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = remove_if_exists(&FileStorage, &path) {
                warn!("failed to remove {:?}: {}", path, e);
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct Domains {
    width: usize,
    entries_per_block: usize,
    ready: bool,
    data: Run,
    getter: Option<Arc<Getter>>,
}

impl Domains {
    pub(crate) fn new(width: usize, entries_per_block: usize) -> Self {
        Domains {
            width,
            entries_per_block,
            ready: true,
            data: Run::new(width),
            getter: None,
        }
    }

    #[inline]
    pub(crate) fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn getter(&self) -> Option<&Arc<Getter>> {
        self.getter.as_ref()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.data.size()
    }

    pub(crate) fn size90(&self) -> usize {
        self.data.size90()
    }

    pub(crate) fn append(&mut self, key: &[u64], value: u64) {
        self.data.append(key, value);
        self.ready = false;
    }

    pub(crate) fn inplace_insert(&mut self, key: &[u64], value: u64, ctx: &Context) {
        self.normalize(ctx);
        self.data.inplace_insert(key, value, ctx.options.duplicates);
    }

    pub(crate) fn normalize(&mut self, ctx: &Context) {
        if self.ready {
            return;
        }
        self.data
            .normalize(ctx.options.reporter.as_ref(), ctx.options.duplicates);
        self.ready = true;
    }

    /// Looks `key` up in memory, then on disk.
    ///
    /// # Panics
    ///
    /// Panics if the bucket has appended entries which are not normalized.
    pub(crate) fn get(&self, key: &[u64], policy: DuplicatePolicy) -> IResult<Option<u64>> {
        assert!(
            self.ready,
            "read against a non-normalized bucket of width {}",
            self.width
        );
        match self.data.lookup(key) {
            Lookup::Resident { value, range } => match (policy, range, &self.getter) {
                (DuplicatePolicy::Combine, Some(range), Some(getter)) => {
                    let old = getter.get(key, range)?;
                    Ok(Some(value | old.unwrap_or(0)))
                }
                _ => Ok(Some(value)),
            },
            Lookup::Disk(range) => match &self.getter {
                Some(getter) => getter.get(key, range),
                None => Ok(None),
            },
            Lookup::Absent => Ok(None),
        }
    }

    /// Writes every entry to a new on-disk run, merged with the previous one,
    /// and keeps a tenth of the entries resident.
    ///
    /// Returns the getter of the superseded run. Nothing changes on failure.
    pub(crate) fn flush(&mut self, ctx: &Context) -> IResult<Option<Arc<Getter>>> {
        let dir = match &ctx.dir {
            Some(dir) => dir,
            None => return Ok(None),
        };
        if self.data.is_empty() {
            return Ok(None);
        }
        self.normalize(ctx);

        let opts = &ctx.options;
        let from = self.data.len();
        opts.reporter
            .flush_started(self.width, from, (from + 9) / 10);

        let tmp = dir.join(format!("{:03}.{:016x}.tmp", self.width, rand::random::<u64>()));
        let mut guard = TempFile {
            path: Some(tmp.clone()),
        };
        let file = FileStorage.create(&tmp)?;
        let mut writer = BlockWriter::new(BufWriter::new(file), self.width, self.entries_per_block);
        if let Some(policy) = &ctx.filter {
            let expected = from + self.getter.as_ref().map_or(0, |g| g.layout().entries());
            writer = writer.with_filter(policy.clone(), expected);
        }

        let (markers, values) = match &self.getter {
            None => (self.data.write_all(&mut writer)?, None),
            Some(getter) => {
                let prev = FileStorage.open(getter.path())?;
                let mut reader = BlockReader::new(BufReader::new(prev), getter.layout())?;
                let (markers, values) = self.data.merge(&mut reader, &mut writer, opts.duplicates)?;
                (markers, Some(values))
            }
        };
        let (w, layout, filter) = writer.finish()?;
        let file = w.into_inner().map_err(|e| e.into_error())?;
        file.sync()?;
        drop(file);

        let path = dir.join(format!("{:03}.{:016x}.run", self.width, rand::random::<u64>()));
        FileStorage.rename(&tmp, &path)?;
        guard.path = Some(path.clone());

        let filter = match (&ctx.filter, filter) {
            (Some(policy), Some(data)) => Some(KeyFilter {
                policy: policy.clone(),
                data,
            }),
            _ => None,
        };
        let getter = Getter::start(path, layout, filter, opts)?;
        guard.disarm();

        self.data.set_markers(markers);
        if let Some(values) = values {
            self.data.set_values(values);
        }
        self.data.drop90();
        opts.reporter
            .flush_finished(self.width, from, self.data.len());
        Ok(self.getter.replace(Arc::new(getter)))
    }
}
