//! Ordering between background cache writes and invalidations.
//!
//! Every invalidation takes a new sequence number and records it against
//! each key it touches. A writer holds a [`WriteTicket`] taken before it read
//! the source of truth; a key may only be written while it has not been
//! invalidated after that ticket.
//!
//! Keys hash onto a fixed set of stripes. Each stripe keeps the per-key
//! sequence numbers for its keys and a gate. Writers check and write under
//! the read side; invalidations pass through the write side once, after
//! recording their sequence number and before deleting. A write that was
//! admitted before the invalidation therefore lands before the delete, and
//! one that comes later sees the newer sequence number and is discarded.
//!
//! The per-key map of a stripe is bounded. When it overflows, the older half
//! is folded into a floor sequence that stands in for every key no longer
//! tracked, so eviction can only turn an admit into a discard.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard};

/// Default number of stripes.
pub const DEFAULT_STRIPES: usize = 256;

/// Default number of invalidated keys remembered per stripe.
pub const DEFAULT_KEYS_PER_STRIPE: usize = 4096;

/// Snapshot of the invalidation sequence, taken before a source read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket {
    sequence: u64,
}

/// Last invalidation sequence per key hash, with a floor for evicted keys.
#[derive(Default)]
struct Epochs {
    by_key: HashMap<u64, u64>,
    floor: u64,
}

impl Epochs {
    fn last_invalidated(&self, key: u64) -> u64 {
        self.by_key.get(&key).copied().unwrap_or(self.floor)
    }

    fn record(&mut self, key: u64, sequence: u64, limit: usize) {
        let entry = self.by_key.entry(key).or_insert(sequence);
        *entry = (*entry).max(sequence);
        if self.by_key.len() > limit {
            self.evict_older_half();
        }
    }

    fn evict_older_half(&mut self) {
        let mut sequences: Vec<u64> = self.by_key.values().copied().collect();
        let middle = sequences.len() / 2;
        let (_, &mut cutoff, _) = sequences.select_nth_unstable(middle);
        self.by_key.retain(|_, sequence| *sequence > cutoff);
        self.floor = self.floor.max(cutoff);
    }
}

struct Stripe {
    epochs: Mutex<Epochs>,
    gate: RwLock<()>,
}

/// Per-key invalidation epochs plus per-stripe write gates.
pub struct InvalidationGate {
    sequence: AtomicU64,
    keys_per_stripe: usize,
    stripes: Box<[Stripe]>,
}

/// Read guards held while admitted keys are written.
pub struct WritePermit<'a> {
    _guards: Vec<RwLockReadGuard<'a, ()>>,
    admitted: Vec<bool>,
}

impl WritePermit<'_> {
    /// Whether the key at `index` (as passed to [`InvalidationGate::admit`]) may be written.
    pub fn is_admitted(&self, index: usize) -> bool {
        self.admitted.get(index).copied().unwrap_or(false)
    }

    pub fn admitted_count(&self) -> usize {
        self.admitted.iter().filter(|a| **a).count()
    }
}

impl Default for InvalidationGate {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl InvalidationGate {
    pub fn new(stripes: usize) -> Self {
        Self::with_key_limit(stripes, DEFAULT_KEYS_PER_STRIPE)
    }

    /// Creates a gate remembering up to `keys_per_stripe` invalidated keys
    /// on each stripe.
    pub fn with_key_limit(stripes: usize, keys_per_stripe: usize) -> Self {
        let stripes = (0..stripes.max(1))
            .map(|_| Stripe {
                epochs: Mutex::new(Epochs::default()),
                gate: RwLock::new(()),
            })
            .collect();

        Self {
            sequence: AtomicU64::new(0),
            keys_per_stripe: keys_per_stripe.max(1),
            stripes,
        }
    }

    /// Takes a ticket. Invalidations that start after this call win over
    /// writes made with it.
    pub fn ticket(&self) -> WriteTicket {
        WriteTicket {
            sequence: self.sequence.load(Ordering::SeqCst),
        }
    }

    fn hash_of(key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn stripe_of(&self, hash: u64) -> usize {
        (hash % self.stripes.len() as u64) as usize
    }

    /// Records an invalidation of `keys` and waits until every write already
    /// admitted on their stripes has finished. Call before deleting.
    pub async fn invalidate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut touched = BTreeSet::new();

        for key in keys {
            let hash = Self::hash_of(key);
            let index = self.stripe_of(hash);
            self.stripes[index]
                .epochs
                .lock()
                .record(hash, sequence, self.keys_per_stripe);
            touched.insert(index);
        }
        for &index in &touched {
            drop(self.stripes[index].gate.write().await);
        }
    }

    /// Decides which of `keys` may still be written with `ticket`. The
    /// returned permit must be held until the write completes.
    pub async fn admit(&self, ticket: WriteTicket, keys: &[String]) -> WritePermit<'_> {
        let hashed: Vec<(u64, usize)> = keys
            .iter()
            .map(|key| {
                let hash = Self::hash_of(key);
                (hash, self.stripe_of(hash))
            })
            .collect();
        let distinct: BTreeSet<usize> = hashed.iter().map(|&(_, index)| index).collect();

        let mut guards = Vec::with_capacity(distinct.len());
        for &index in &distinct {
            guards.push(self.stripes[index].gate.read().await);
        }

        let admitted = hashed
            .iter()
            .map(|&(hash, index)| self.stripes[index].epochs.lock().last_invalidated(hash) <= ticket.sequence)
            .collect();

        WritePermit {
            _guards: guards,
            admitted,
        }
    }
}
