//! Background reader of one on-disk run.
//!
//! A `Getter` owns a worker thread which owns the file. Callers check the
//! bloom filter and the block cache themselves and only queue requests which
//! need the disk. Each caller waits on a completion slot taken from a fixed
//! pool, so the number of blocked callers per getter is bounded too.
use crate::cache::{Cache, LRUCache};
use crate::disk::{BlockLayout, DiskRange};
use crate::error::Error;
use crate::filter::FilterPolicy;
use crate::opt::Options;
use crate::run::Run;
use crate::storage::{remove_if_exists, File, FileStorage, Storage};
use crate::util::reporter::Reporter;
use crate::IResult;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use fxhash::FxHashMap;
use log::{debug, warn};
use std::fs::File as SysFile;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Reply = IResult<Option<u64>>;

/// Decoded ranges shared by the callers and the worker.
type BlockCache = LRUCache<DiskRange, Arc<Run>>;

struct Request {
    key: Vec<u64>,
    range: DiskRange,
    reply: Sender<Reply>,
}

struct Slot {
    tx: Sender<Reply>,
    rx: Receiver<Reply>,
}

/// Gives the slot back to the pool when the caller is done with it.
struct SlotGuard<'a> {
    pool: &'a Sender<Slot>,
    slot: Option<Slot>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let _ = self.pool.send(slot);
        }
    }
}

/// A filter over every key of the file.
pub(crate) struct KeyFilter {
    pub(crate) policy: Arc<dyn FilterPolicy>,
    pub(crate) data: Vec<u8>,
}

pub struct Getter {
    path: PathBuf,
    layout: BlockLayout,
    filter: Option<KeyFilter>,
    cache: Option<Arc<BlockCache>>,
    // `None` once stopped. Senders hold the read lock while queueing so no
    // request can slip in behind the shutdown.
    sender: RwLock<Option<Sender<Request>>>,
    slots: (Sender<Slot>, Receiver<Slot>),
    worker: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Getter {
    /// Opens the run at `path` and starts its worker.
    pub(crate) fn start(
        path: PathBuf,
        layout: BlockLayout,
        filter: Option<KeyFilter>,
        options: &Options,
    ) -> IResult<Getter> {
        let file = FileStorage.open(&path)?;
        let len = file.len()?;
        if len != layout.file_size() {
            return Err(Error::IO(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{:?} holds {} bytes, expected {}",
                    path,
                    len,
                    layout.file_size()
                ),
            )));
        }

        let cache = if options.block_cache_capacity > 0 {
            let width = layout.width;
            let cache = BlockCache::new(options.block_cache_capacity).with_evict_hook(
                move |range: &DiskRange, _: &Arc<Run>| {
                    debug!("evicting range {:?} of {} subarray", range, width);
                },
            );
            Some(Arc::new(cache))
        } else {
            None
        };

        let (slot_tx, slot_rx) = bounded(options.completion_slots);
        for _ in 0..options.completion_slots {
            let (tx, rx) = bounded(1);
            let _ = slot_tx.send(Slot { tx, rx });
        }

        let (tx, rx) = bounded(options.request_queue_size);
        let worker = Worker {
            path: path.clone(),
            file,
            layout,
            cache: cache.clone(),
            reporter: options.reporter.clone(),
        };
        let coalescing = options.read_coalescing;
        let handle = thread::Builder::new()
            .name(format!("sdnt-getter-{}", layout.width))
            .spawn(move || match coalescing {
                Some(interval) => worker.run_coalescing(rx, interval),
                None => worker.run(rx),
            })?;
        debug!(
            "getter of {} subarray started on {:?} with {} entries, filter {}",
            layout.width,
            path,
            layout.entries(),
            filter.as_ref().map_or("none", |f| f.policy.name())
        );

        Ok(Getter {
            path,
            layout,
            filter,
            cache,
            sender: RwLock::new(Some(tx)),
            slots: (slot_tx, slot_rx),
            worker: Mutex::new(Some(handle)),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Returns true if `key` may be in the file.
    pub fn may_contain(&self, key: &[u64]) -> bool {
        match &self.filter {
            Some(f) => f.policy.key_may_match(&f.data, key),
            None => true,
        }
    }

    /// Looks `key` up within `range` of the file.
    pub fn get(&self, key: &[u64], range: DiskRange) -> IResult<Option<u64>> {
        if !self.may_contain(key) {
            return Ok(None);
        }
        if let Some(cache) = &self.cache {
            if let Some(run) = cache.get(&range) {
                return Ok(run.find(key));
            }
        }

        let slot = self
            .slots
            .1
            .recv()
            .map_err(|_| Error::GetterStopped(self.path.clone()))?;
        let mut guard = SlotGuard {
            pool: &self.slots.0,
            slot: None,
        };
        let slot = guard.slot.insert(slot);
        {
            let sender = self
                .sender
                .read()
                .map_err(|_| Error::GetterStopped(self.path.clone()))?;
            let sender = match sender.as_ref() {
                Some(s) => s,
                None => return Err(Error::GetterStopped(self.path.clone())),
            };
            let req = Request {
                key: key.to_vec(),
                range,
                reply: slot.tx.clone(),
            };
            sender
                .send(req)
                .map_err(|_| Error::GetterStopped(self.path.clone()))?;
        }
        slot.rx
            .recv()
            .map_err(|_| Error::GetterStopped(self.path.clone()))?
    }

    /// Stops the worker once every queued request is served, then deletes
    /// the file. Stopping a stopped getter does nothing.
    pub fn stop(&self) -> IResult<()> {
        let sender = match self.sender.write() {
            Ok(mut s) => s.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if sender.is_none() {
            return Ok(());
        }
        // Disconnecting the queue tells the worker to drain and exit.
        drop(sender);
        self.stopped.store(true, Ordering::Release);

        let handle = match self.worker.lock() {
            Ok(mut w) => w.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("getter worker of {:?} panicked", self.path);
            }
        }
        remove_if_exists(&FileStorage, &self.path)?;
        if let Some(cache) = &self.cache {
            debug!(
                "getter of {:?} stopped with {} cached ranges charging {}",
                self.path,
                cache.len(),
                cache.total_charge()
            );
        } else {
            debug!("getter of {:?} stopped", self.path);
        }
        Ok(())
    }
}

impl Drop for Getter {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop getter of {:?}: {}", self.path, e);
        }
    }
}

struct Worker {
    path: PathBuf,
    file: SysFile,
    layout: BlockLayout,
    cache: Option<Arc<BlockCache>>,
    reporter: Arc<dyn Reporter>,
}

impl Worker {
    /// Serves requests in arrival order until the queue is disconnected.
    fn run(self, rx: Receiver<Request>) {
        for req in rx.iter() {
            let range = req.range;
            self.serve(range, vec![req], rx.len());
        }
    }

    /// Groups requests by range and serves the largest group on every tick.
    fn run_coalescing(self, rx: Receiver<Request>, interval: Duration) {
        let ticker = tick(interval);
        let mut pending: FxHashMap<DiskRange, Vec<Request>> = FxHashMap::default();
        let mut connected = true;
        while connected {
            select! {
                recv(rx) -> msg => match msg {
                    Ok(req) => pending.entry(req.range).or_insert_with(Vec::new).push(req),
                    Err(_) => connected = false,
                },
                recv(ticker) -> _ => {
                    let largest = pending
                        .iter()
                        .max_by_key(|(_, group)| group.len())
                        .map(|(range, _)| *range);
                    if let Some(range) = largest {
                        if let Some(group) = pending.remove(&range) {
                            self.serve(range, group, pending.len());
                        }
                    }
                }
            }
        }
        let mut groups: Vec<_> = pending.into_iter().collect();
        groups.sort_by_key(|(_, group)| std::cmp::Reverse(group.len()));
        let mut queued = groups.len();
        for (range, group) in groups {
            queued -= 1;
            self.serve(range, group, queued);
        }
    }

    fn serve(&self, range: DiskRange, group: Vec<Request>, queued: usize) {
        let cached = self.cache.as_ref().and_then(|c| c.get(&range));
        let result = match cached {
            Some(run) => Ok(run),
            None => self.read(range, group.len(), queued),
        };
        for req in group {
            let reply = match &result {
                Ok(run) => Ok(run.find(&req.key)),
                Err(e) => Err(Error::DiskRead {
                    path: self.path.clone(),
                    source: e.clone(),
                }),
            };
            let _ = req.reply.send(reply);
        }
    }

    /// Reads and decodes the blocks covering `range`.
    fn read(&self, range: DiskRange, requests: usize, queued: usize) -> Result<Arc<Run>, Arc<io::Error>> {
        let mut run = Run::new(self.layout.width);
        if let Some(span) = self.layout.span(range) {
            self.reporter
                .disk_read(self.layout.width, span.first, span.last, requests, queued);
            let mut buf = vec![0; span.entries * self.layout.entry_bytes()];
            self.file
                .read_exact_at(&mut buf, span.offset)
                .map_err(|e| Arc::new(into_io(e)))?;
            let mut rest = &buf[..];
            for block in span.first..=span.last {
                let count = self.layout.block_entries(block);
                rest = run.extend_from_block(rest, count);
            }
        }
        let run = Arc::new(run);
        if let Some(cache) = &self.cache {
            cache.insert(range, run.clone(), 1);
        }
        Ok(run)
    }
}

fn into_io(e: Error) -> io::Error {
    match e {
        Error::IO(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}
