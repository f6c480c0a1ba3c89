use crate::cache::Cache;
use fxhash::FxHashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const NIL: usize = usize::MAX;

struct LRUEntry<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
    charge: usize,
}

type EvictHook<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// Least recently used cache bounded by the total charge of its entries.
pub struct LRUCache<K, V: Clone> {
    // The capacity of LRU
    capacity: usize,
    inner: Mutex<LRUInner<K, V>>,
    // The total charge of the cached entries.
    usage: AtomicUsize,
    evict_hook: Option<EvictHook<K, V>>,
}

/// Entries live in a slab and are linked from the most recently used `head`
/// to the least recently used `tail`.
struct LRUInner<K, V> {
    table: FxHashMap<K, usize>,
    slab: Vec<Option<LRUEntry<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<K, V> LRUInner<K, V> {
    fn entry(&self, i: usize) -> &LRUEntry<K, V> {
        self.slab[i].as_ref().expect("linked entry is vacant")
    }

    fn entry_mut(&mut self, i: usize) -> &mut LRUEntry<K, V> {
        self.slab[i].as_mut().expect("linked entry is vacant")
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = {
            let e = self.entry(i);
            (e.prev, e.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.entry_mut(prev).next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entry_mut(next).prev = prev;
        }
    }

    fn push_front(&mut self, i: usize) {
        let head = self.head;
        {
            let e = self.entry_mut(i);
            e.prev = NIL;
            e.next = head;
        }
        if head == NIL {
            self.tail = i;
        } else {
            self.entry_mut(head).prev = i;
        }
        self.head = i;
    }

    fn move_to_head(&mut self, i: usize) {
        if self.head != i {
            self.unlink(i);
            self.push_front(i);
        }
    }

    fn alloc(&mut self, entry: LRUEntry<K, V>) -> usize {
        match self.free.pop() {
            Some(i) => {
                self.slab[i] = Some(entry);
                i
            }
            None => {
                self.slab.push(Some(entry));
                self.slab.len() - 1
            }
        }
    }

    fn release(&mut self, i: usize) -> LRUEntry<K, V> {
        self.unlink(i);
        self.free.push(i);
        self.slab[i].take().expect("linked entry is vacant")
    }
}

impl<K: Hash + Eq + Clone, V: Clone> LRUCache<K, V> {
    pub fn new(cap: usize) -> Self {
        LRUCache {
            capacity: cap,
            inner: Mutex::new(LRUInner {
                table: FxHashMap::default(),
                slab: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
            }),
            usage: AtomicUsize::new(0),
            evict_hook: None,
        }
    }

    /// Sets a callback run for every value leaving the cache.
    pub fn with_evict_hook(mut self, hook: impl Fn(&K, &V) + Send + Sync + 'static) -> Self {
        self.evict_hook = Some(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.table.len()).unwrap_or(0)
    }

    fn evicted(&self, key: &K, value: &V) {
        if let Some(hk) = &self.evict_hook {
            hk(key, value);
        }
    }
}

impl<K, V> Cache<K, V> for LRUCache<K, V>
where
    K: Sync + Send + Hash + Eq + Clone,
    V: Sync + Send + Clone,
{
    fn insert(&self, key: K, value: V, charge: usize) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        let mut inner = self.inner.lock().ok()?;
        if let Some(&i) = inner.table.get(&key) {
            // Replace entry.
            let old = {
                let e = inner.entry_mut(i);
                let old = std::mem::replace(&mut e.value, value);
                let old_charge = std::mem::replace(&mut e.charge, charge);
                self.usage.fetch_sub(old_charge, Ordering::Relaxed);
                old
            };
            self.usage.fetch_add(charge, Ordering::Relaxed);
            inner.move_to_head(i);
            self.evicted(&key, &old);
            return Some(old);
        }

        // Insert entry.
        while inner.tail != NIL && self.usage.load(Ordering::Acquire) + charge > self.capacity {
            let tail = inner.tail;
            let e = inner.release(tail);
            inner.table.remove(&e.key);
            self.usage.fetch_sub(e.charge, Ordering::Relaxed);
            self.evicted(&e.key, &e.value);
        }
        let i = inner.alloc(LRUEntry {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
            charge,
        });
        inner.push_front(i);
        inner.table.insert(key, i);
        self.usage.fetch_add(charge, Ordering::Relaxed);
        None
    }

    fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        let i = *inner.table.get(key)?;
        inner.move_to_head(i);
        Some(inner.entry(i).value.clone())
    }

    #[inline]
    fn total_charge(&self) -> usize {
        self.usage.load(Ordering::Acquire)
    }
}
