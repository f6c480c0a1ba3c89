use crate::disk::{entries_per_block, MAX_WIDTH};
use crate::domain::{drop_leftmost_label, encode, WordKey};
use crate::domains::Domains;
use crate::error::Error;
use crate::filter::{BloomFilter, FilterPolicy};
use crate::getter::Getter;
use crate::opt::Options;
use crate::storage::{File, FileStorage, Storage};
use crate::IResult;
use log::{info, warn};
use std::fs::File as SysFile;
use std::path::PathBuf;
use std::sync::Arc;

const LOCK_FILE: &str = "LOCK";

/// State shared by every snapshot of a table.
pub(crate) struct Context {
    pub(crate) options: Options,
    pub(crate) dir: Option<PathBuf>,
    pub(crate) filter: Option<Arc<dyn FilterPolicy>>,
    lock: Option<SysFile>,
}

impl Context {
    pub(crate) fn new(options: Options) -> IResult<Self> {
        options.validate()?;
        let filter: Option<Arc<dyn FilterPolicy>> = if options.bloom_bits_per_key > 0 {
            Some(Arc::new(BloomFilter::new(options.bloom_bits_per_key)))
        } else {
            None
        };
        Ok(Context {
            dir: options.storage_path.clone(),
            options,
            filter,
            lock: None,
        })
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.unlock_file() {
                warn!("failed to unlock {:?}: {}", self.dir, e);
            }
        }
    }
}

/// A table of domain names mapped to 64-bit masks.
///
/// Names are bucketed by the number of words of their encoded key, so keys
/// of a bucket compare word by word. A table is a cheap snapshot: `insert`
/// and `append` consume it and return a new one which shares every bucket
/// but the one they touch.
#[derive(Clone)]
pub struct Table64 {
    root: Option<u64>,
    body: Vec<Arc<Domains>>,
    ctx: Arc<Context>,
}

impl Table64 {
    /// Creates an in-memory table with default options.
    pub fn new() -> Self {
        Self::with_context(Context {
            options: Options::default(),
            dir: None,
            filter: None,
            lock: None,
        })
    }

    /// Creates a table. With a storage path the directory is created if
    /// needed and locked, and runs left behind by a previous process are
    /// removed.
    pub fn open(options: Options) -> IResult<Self> {
        let mut ctx = Context::new(options)?;
        if let Some(dir) = ctx.dir.clone() {
            let env = FileStorage;
            env.mkdir_all(&dir)?;
            let lock_path = dir.join(LOCK_FILE);
            let lock = if env.exists(&lock_path) {
                env.open(&lock_path)?
            } else {
                env.create(&lock_path)?
            };
            if lock.lock_file().is_err() {
                return Err(Error::Locked(dir));
            }
            ctx.lock = Some(lock);

            for path in env.list(&dir)? {
                let stale = path
                    .extension()
                    .map_or(false, |ext| ext == "run" || ext == "tmp");
                if stale {
                    env.remove(&path)?;
                    info!("removed stale run {:?}", path);
                }
            }
            info!("table opened on {:?}", dir);
        }
        Ok(Self::with_context(ctx))
    }

    fn with_context(ctx: Context) -> Self {
        let body = (1..=MAX_WIDTH)
            .map(|width| Arc::new(Domains::new(width, entries_per_block(width))))
            .collect();
        Table64 {
            root: None,
            body,
            ctx: Arc::new(ctx),
        }
    }

    pub fn options(&self) -> &Options {
        &self.ctx.options
    }

    /// Returns the value of the longest stored suffix of `name`, down to the
    /// value of the root zone.
    pub fn get(&self, name: &str) -> IResult<Option<u64>> {
        let key = encode(name)?;
        self.get_key(&key)
    }

    /// Keys wider than any encoded name fail with `NameTooLong`.
    ///
    /// # Panics
    ///
    /// Panics if a bucket on the way has appended entries which are not
    /// normalized.
    pub fn get_key(&self, key: &WordKey) -> IResult<Option<u64>> {
        if key.len() > MAX_WIDTH {
            return Err(Error::NameTooLong);
        }
        let policy = self.ctx.options.duplicates;
        let mut key = key.clone();
        while !key.is_empty() {
            if let Some(v) = self.bucket(&key).get(&key, policy)? {
                return Ok(Some(v));
            }
            key = drop_leftmost_label(&key);
        }
        Ok(self.root)
    }

    fn bucket(&self, key: &WordKey) -> &Domains {
        &self.body[key.len() - 1]
    }

    fn bucket_mut(&mut self, key: &WordKey) -> &mut Domains {
        Arc::make_mut(&mut self.body[key.len() - 1])
    }

    fn set_root(&mut self, value: u64) {
        self.root = Some(match self.root {
            Some(old) => self.ctx.options.duplicates.apply(old, value),
            None => value,
        });
    }

    /// Inserts keeping the bucket sorted. Returns the new table and the
    /// getters superseded by flushes.
    pub fn insert(mut self, name: &str, value: u64) -> IResult<(Self, Vec<Arc<Getter>>)> {
        let garbage = self.inplace_insert(name, value)?;
        Ok((self, garbage))
    }

    /// Appends to the bucket, which gets sorted before the next read.
    /// Returns the new table and the getters superseded by flushes.
    pub fn append(mut self, name: &str, value: u64) -> IResult<(Self, Vec<Arc<Getter>>)> {
        let key = encode(name)?;
        if key.is_empty() {
            self.set_root(value);
        } else {
            self.bucket_mut(&key).append(&key, value);
        }
        let garbage = self.flush_if_needed()?;
        Ok((self, garbage))
    }

    /// Inserts into this very table, copying the bucket only if a snapshot
    /// still shares it.
    pub fn inplace_insert(&mut self, name: &str, value: u64) -> IResult<Vec<Arc<Getter>>> {
        let key = encode(name)?;
        if key.is_empty() {
            self.set_root(value);
        } else {
            let ctx = self.ctx.clone();
            self.bucket_mut(&key).inplace_insert(&key, value, &ctx);
        }
        self.flush_if_needed()
    }

    /// Sorts every bucket with appended entries.
    pub fn normalize(mut self) -> Self {
        self.normalize_in_place();
        self
    }

    pub fn normalize_in_place(&mut self) {
        let ctx = self.ctx.clone();
        for d in self.body.iter_mut() {
            if !d.is_ready() {
                Arc::make_mut(d).normalize(&ctx);
            }
        }
    }

    /// Resident size in bytes.
    pub fn size(&self) -> usize {
        self.body.iter().map(|d| d.size()).sum()
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.body.iter().map(|d| d.len()).sum::<usize>() + self.root.map_or(0, |_| 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes buckets while the resident size is over the limit, largest
    /// first, until it drops to half the limit.
    pub fn flush_if_needed(&mut self) -> IResult<Vec<Arc<Getter>>> {
        let limit = self.ctx.options.resident_size_limit;
        let mut garbage = vec![];
        if self.ctx.dir.is_none() || limit == 0 || self.size() <= limit {
            return Ok(garbage);
        }
        let ctx = self.ctx.clone();
        loop {
            let (i, size90) = self
                .body
                .iter()
                .enumerate()
                .map(|(i, d)| (i, d.size90()))
                .max_by_key(|&(_, s)| s)
                .unwrap_or((0, 0));
            if size90 == 0 {
                break;
            }
            if let Some(g) = Arc::make_mut(&mut self.body[i]).flush(&ctx)? {
                garbage.push(g);
            }
            if self.size() < limit / 2 {
                break;
            }
        }
        Ok(garbage)
    }

    /// Flushes every bucket holding resident entries.
    pub fn flush_all(&mut self) -> IResult<Vec<Arc<Getter>>> {
        let ctx = self.ctx.clone();
        let mut garbage = vec![];
        for d in self.body.iter_mut() {
            if d.len() == 0 {
                continue;
            }
            if let Some(g) = Arc::make_mut(d).flush(&ctx)? {
                garbage.push(g);
            }
        }
        Ok(garbage)
    }

    /// Stops every getter of the table, which deletes their files. Other
    /// snapshots sharing those getters can't read from disk anymore.
    pub fn close(self) -> IResult<()> {
        let mut result = Ok(());
        for d in self.body.iter() {
            if let Some(getter) = d.getter() {
                if let Err(e) = getter.stop() {
                    warn!("failed to stop getter of {:?}: {}", getter.path(), e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        if let Some(dir) = &self.ctx.dir {
            info!("table on {:?} closed", dir);
        }
        result
    }
}

impl Default for Table64 {
    fn default() -> Self {
        Self::new()
    }
}
