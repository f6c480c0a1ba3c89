use crate::filter::FilterPolicy;

pub struct BloomFilter {
    pub bits_per_key: usize,
    pub k: usize,
}

impl BloomFilter {
    pub fn new(bits_per_key: usize) -> Self {
        // We intentionally round down to reduce probing cost a little bit.
        let mut k = bits_per_key as f32 * 0.69; // 0.69 =~ ln(2)
        if k < 1f32 {
            k = 1f32;
        } else if k > 30f32 {
            k = 30f32;
        }
        BloomFilter {
            bits_per_key,
            k: k as usize,
        }
    }
}

fn bloom_hash(key: &[u64]) -> u64 {
    let mut h = fxhash::hash64(key);
    // Spread the product bits of FxHash down to the low bits used for probing.
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^ (h >> 33)
}

/// The last byte of a filter holds the number of probes.
fn probes(filter: &[u8]) -> Option<(usize, usize)> {
    let len = filter.len();
    if len < 2 {
        return None;
    }
    Some(((len - 1) * 8, filter[len - 1] as usize))
}

impl FilterPolicy for BloomFilter {
    fn name(&self) -> &str {
        "BloomFilter"
    }

    fn new_filter(&self, keys: usize) -> Vec<u8> {
        // For small n, we can see a very high false positive rate.
        // Fix it by enforcing a minimum bloom filter length.
        let bits = (keys * self.bits_per_key).max(64);
        let bytes = (bits + 7) / 8;
        let mut filter = vec![0; bytes + 1];
        filter[bytes] = self.k as u8;
        filter
    }

    fn add_key(&self, filter: &mut [u8], key: &[u64]) {
        let (bits, k) = match probes(filter) {
            Some(p) => p,
            None => return,
        };
        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let pos = (h % bits as u64) as usize;
            filter[pos / 8] |= 1 << (pos % 8);
            h = h.wrapping_add(delta);
        }
    }

    fn key_may_match(&self, filter: &[u8], key: &[u64]) -> bool {
        let (bits, k) = match probes(filter) {
            Some(p) => p,
            None => return false,
        };
        if k > 30 {
            // Reserved for potentially new encodings.
            return true;
        }
        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let pos = (h % bits as u64) as usize;
            if filter[pos / 8] & (1 << (pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u64) -> [u64; 2] {
        [i.wrapping_mul(0x9e37_79b9), 0x4d4f_4341]
    }

    fn create_filter(f: &BloomFilter, keys: &[&[u64]]) -> Vec<u8> {
        let mut filter = f.new_filter(keys.len());
        for key in keys {
            f.add_key(&mut filter, key);
        }
        filter
    }

    #[test]
    fn test_probes() {
        let mut cases = vec![(0, 1), (1, 1), (2, 1), (10, 6), (20, 13), (100, 30)];
        for (bits, k) in cases.drain(..) {
            assert_eq!(k, BloomFilter::new(bits).k, "{} bits per key", bits);
        }
    }

    #[test]
    fn test_empty_filter() {
        let f = BloomFilter::new(10);
        let filter = create_filter(&f, &[]);
        assert_eq!(9, filter.len());
        assert!(!f.key_may_match(&filter, &key(1)));
        assert!(!f.key_may_match(&[], &key(1)));
    }

    #[test]
    fn test_small_filter() {
        let f = BloomFilter::new(10);
        let (a, b) = (key(1), key(2));
        let filter = create_filter(&f, &[&a[..], &b[..]]);
        assert!(f.key_may_match(&filter, &a));
        assert!(f.key_may_match(&filter, &b));
        assert!(!f.key_may_match(&filter, &key(100)));
        assert!(!f.key_may_match(&filter, &key(1000)));
    }

    #[test]
    fn test_varying_lengths() {
        let f = BloomFilter::new(10);
        let mut n = 1;
        while n <= 10000 {
            let keys: Vec<[u64; 2]> = (0..n as u64).map(key).collect();
            let refs: Vec<&[u64]> = keys.iter().map(|k| &k[..]).collect();
            let filter = create_filter(&f, &refs);
            assert!(filter.len() <= (n * 10 / 8) + 40, "{} keys", n);

            // All added keys must match.
            for k in keys.iter() {
                assert!(f.key_may_match(&filter, k), "{} keys", n);
            }

            let rate = (0..10000u64)
                .filter(|i| f.key_may_match(&filter, &key(i + 1_000_000_000)))
                .count() as f64
                / 10000.0;
            assert!(rate <= 0.03, "{} keys: false positive rate {}", n, rate);
            n = if n < 10 {
                n + 1
            } else if n < 100 {
                n + 10
            } else if n < 1000 {
                n + 100
            } else {
                n + 1000
            };
        }
    }
}
