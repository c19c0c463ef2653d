//! Approximate at-most-once admission set.
//!
//! A plain blocked-bit-vector Bloom filter sized from an expected
//! cardinality and a target false-positive rate. The single hot operation is
//! `test_and_add`, serialized by an internal mutex that is only ever held
//! for the few bit probes; a false positive silently drops a real hostname,
//! which is the documented tradeoff for constant memory.

use anyhow::{bail, Context, Result};
use fnv::FnvHasher;
use std::hash::Hasher;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

const MAGIC: &[u8; 4] = b"RCBF";

pub struct BloomFilter {
    inner: Mutex<Bits>,
}

struct Bits {
    words: Vec<u64>,
    m: u64,
    k: u32,
}

fn hash_pair(key: &[u8]) -> (u64, u64) {
    let mut h = FnvHasher::default();
    h.write(key);
    let h1 = h.finish();
    let mut h = FnvHasher::with_key(h1);
    h.write(key);
    // second hash must be odd so the probe sequence covers the vector
    let h2 = h.finish() | 1;
    (h1, h2)
}

impl BloomFilter {
    /// Size the filter for `n` expected insertions at false-positive rate `p`.
    pub fn with_estimates(n: usize, p: f64) -> Self {
        let n = n.max(1) as f64;
        let p = p.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;
        let m = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let k = ((m as f64 / n) * ln2).round().max(1.0) as u32;
        BloomFilter {
            inner: Mutex::new(Bits {
                words: vec![0u64; ((m + 63) / 64) as usize],
                m,
                k,
            }),
        }
    }

    /// Atomically test membership and insert. Returns true when the key was
    /// (probably) already present.
    pub fn test_and_add(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        let mut bits = self.inner.lock().unwrap();
        let m = bits.m;
        let mut present = true;
        for i in 0..bits.k as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % m;
            let (word, mask) = ((bit / 64) as usize, 1u64 << (bit % 64));
            if bits.words[word] & mask == 0 {
                present = false;
                bits.words[word] |= mask;
            }
        }
        present
    }

    /// Persist the bit vector so a later run can resume the dedup set.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bits = self.inner.lock().unwrap();
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("create bloom file {}", path.display()))?;
        f.write_all(MAGIC)?;
        f.write_all(&bits.k.to_le_bytes())?;
        f.write_all(&bits.m.to_le_bytes())?;
        for w in &bits.words {
            f.write_all(&w.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut f = std::fs::File::open(path)
            .with_context(|| format!("open bloom file {}", path.display()))?;
        let mut magic = [0u8; 4];
        f.read_exact(&mut magic)?;
        if &magic != MAGIC {
            bail!("{} is not a bloom filter file", path.display());
        }
        let mut k4 = [0u8; 4];
        f.read_exact(&mut k4)?;
        let k = u32::from_le_bytes(k4);
        let mut m8 = [0u8; 8];
        f.read_exact(&mut m8)?;
        let m = u64::from_le_bytes(m8);
        if k == 0 || m == 0 {
            bail!("{}: corrupt bloom header", path.display());
        }
        let n_words = ((m + 63) / 64) as usize;
        let mut words = vec![0u64; n_words];
        let mut w8 = [0u8; 8];
        for w in words.iter_mut() {
            f.read_exact(&mut w8)?;
            *w = u64::from_le_bytes(w8);
        }
        Ok(BloomFilter {
            inner: Mutex::new(Bits { words, m, k }),
        })
    }
}
