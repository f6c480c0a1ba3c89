use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdntable::{DuplicatePolicy, Options, Reporter, Table64};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Counters {
    flushes: AtomicUsize,
    reads: AtomicUsize,
}

impl Reporter for Counters {
    fn flush_finished(&self, _width: usize, _from: usize, _to: usize) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn disk_read(&self, _width: usize, _from: usize, _to: usize, _requests: usize, _queued: usize) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_three_domains_in_memory() {
    let t = Table64::new();
    let (t, _) = t.insert("a.com", 1).unwrap();
    let (t, _) = t.insert("b.com", 2).unwrap();
    let (t, _) = t.insert("c.com", 4).unwrap();

    assert_eq!(Some(1), t.get("a.com").unwrap());
    assert_eq!(Some(2), t.get("B.COM").unwrap());
    assert_eq!(Some(4), t.get("c.com.").unwrap());
    // The longest stored suffix answers.
    assert_eq!(Some(1), t.get("x.a.com").unwrap());
    assert_eq!(None, t.get("d.com").unwrap());
    assert_eq!(None, t.get("a.org").unwrap());
}

#[test]
fn test_ten_thousand_domains_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let counters = Arc::new(Counters::default());
    let opts = Options::default()
        .with_path(dir.path())
        .with_limit(64 << 10)
        .with_reporter(counters.clone());
    let mut t = Table64::open(opts).unwrap();

    // All keys encode to two words and land in one bucket.
    let names: Vec<String> = (0..10_000).map(|i| format!("d{:05}.com", i)).collect();
    for (i, name) in names.iter().enumerate() {
        let (next, garbage) = t.append(name, i as u64 * 3 + 1).unwrap();
        drop(garbage);
        t = next;
    }
    t.flush_all().unwrap();
    assert!(counters.flushes.load(Ordering::SeqCst) > 1);
    assert!(t.size() < 64 << 10);

    for (i, name) in names.iter().enumerate() {
        assert_eq!(Some(i as u64 * 3 + 1), t.get(name).unwrap(), "{}", name);
    }
    assert!(counters.reads.load(Ordering::SeqCst) > 0);
    assert_eq!(None, t.get("d10000.com").unwrap());
    t.close().unwrap();
}

#[test]
fn test_values_survive_repeated_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let mut t = Table64::open(Options::default().with_path(dir.path())).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let mut expect = std::collections::BTreeMap::new();
    for round in 0..5u64 {
        for _ in 0..400 {
            let name = format!("h{}.example.net", rng.gen_range(0..1500));
            t.inplace_insert(&name, round).unwrap();
            expect.insert(name, round);
        }
        t.flush_all().unwrap();
        for (name, v) in expect.iter() {
            assert_eq!(Some(*v), t.get(name).unwrap(), "round {} {}", round, name);
        }
        assert_eq!(None, t.get("h1500.example.net").unwrap());
    }
}

#[test]
fn test_combine_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let opts = Options::default()
        .with_path(dir.path())
        .with_duplicates(DuplicatePolicy::Combine);
    let mut t = Table64::open(opts).unwrap();
    for i in 0..100 {
        t.inplace_insert(&format!("s{}.org", i), 1).unwrap();
    }
    t.flush_all().unwrap();
    for i in 0..100 {
        t.inplace_insert(&format!("s{}.org", i), 1 << (i % 3 + 1)).unwrap();
    }
    for i in 0..100 {
        let expect = 1 | 1 << (i % 3 + 1);
        assert_eq!(Some(expect), t.get(&format!("s{}.org", i)).unwrap());
    }
    t.flush_all().unwrap();
    for i in 0..100 {
        let expect = 1 | 1 << (i % 3 + 1);
        assert_eq!(Some(expect), t.get(&format!("s{}.org", i)).unwrap());
    }
}

#[test]
fn test_concurrent_readers() {
    let dir = tempfile::tempdir().unwrap();
    let opts = Options::default()
        .with_path(dir.path())
        .with_limit(32 << 10)
        .with_read_coalescing(Duration::from_micros(100))
        .with_block_cache_capacity(4);
    let mut t = Table64::open(opts).unwrap();
    for i in 0..5000u64 {
        t.inplace_insert(&format!("r{}.example.org", i), i).unwrap();
    }
    t.flush_all().unwrap();

    let t = &t;
    crossbeam_utils::thread::scope(|s| {
        for worker in 0..8u64 {
            s.spawn(move |_| {
                let mut rng = StdRng::seed_from_u64(worker);
                for _ in 0..500 {
                    let i = rng.gen_range(0..5000u64);
                    let name = format!("www.r{}.example.org", i);
                    assert_eq!(Some(i), t.get(&name).unwrap(), "{}", name);
                }
            });
        }
    })
    .unwrap();
}

#[test]
fn test_snapshot_keeps_reading_after_flush() {
    let dir = tempfile::tempdir().unwrap();
    let opts = Options::default().with_path(dir.path()).with_limit(16 << 10);
    let mut t = Table64::open(opts).unwrap();
    for i in 0..2000u64 {
        t.inplace_insert(&format!("k{}.net", i), i).unwrap();
    }
    let snapshot = t.clone();
    let mut garbage = vec![];
    for i in 2000..4000u64 {
        let (next, g) = t.append(&format!("k{}.net", i), i).unwrap();
        garbage.extend(g);
        t = next;
    }
    let t = t.normalize();
    // Superseded getters stay alive while the snapshot holds them.
    drop(garbage);
    for i in (0..2000u64).step_by(7) {
        let name = format!("k{}.net", i);
        assert_eq!(Some(i), snapshot.get(&name).unwrap());
        assert_eq!(Some(i), t.get(&name).unwrap());
    }
    assert_eq!(None, snapshot.get("k3000.net").unwrap());
    assert_eq!(Some(3000), t.get("k3000.net").unwrap());
}
