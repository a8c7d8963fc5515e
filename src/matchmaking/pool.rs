//! The waiting pool (spec §4.3): a rating-ordered set of queued entries with an
//! auxiliary index enforcing the one-entry-per-user invariant.
//!
//! Modeled as a value type the way the design notes require: entries carry only an
//! opaque channel handle, never a reference a match runner could use to reach back into
//! the pool after pairing.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::channel::DuelChannel;
use crate::models::UserId;

/// Sort key: `(rating, joined_at)` ascending, as an orderable tuple. Rating is
/// quantized to tenths (the data model's stated precision) so it can live in a
/// `BTreeMap` key, which requires `Ord` and `f64` is not `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PoolKey {
    rating_tenths: i64,
    joined_at_nanos: u128,
    user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub user_id: UserId,
    pub rating: f64,
    pub joined_at: Instant,
    pub channel_ref: DuelChannel,
}

fn pool_key(entry: &WaitingEntry, epoch: Instant) -> PoolKey {
    PoolKey {
        rating_tenths: (entry.rating * 10.0).round() as i64,
        joined_at_nanos: entry
            .joined_at
            .saturating_duration_since(epoch)
            .as_nanos(),
        user_id: entry.user_id,
    }
}

/// A rating-ordered waiting pool with O(log n) insert/remove and an O(n) pairing scan.
///
/// Not `Sync`-safe on its own: callers (the matchmaker loop and the presence registry)
/// hold it behind a single mutex and never yield while that mutex is held, per spec §5.
pub struct WaitingPool {
    by_key: BTreeMap<PoolKey, WaitingEntry>,
    index: std::collections::HashMap<UserId, PoolKey>,
    /// A fixed reference point so `joined_at` instants can be ordered as integers.
    epoch: Instant,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self {
            by_key: BTreeMap::new(),
            index: std::collections::HashMap::new(),
            epoch: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.index.contains_key(&user_id)
    }

    /// Inserts a new entry. If `user_id` is already present, this is a no-op: the
    /// uniqueness invariant means callers must `remove` first if they intend to replace.
    pub fn insert(&mut self, entry: WaitingEntry) {
        if self.index.contains_key(&entry.user_id) {
            return;
        }
        let key = pool_key(&entry, self.epoch);
        self.index.insert(entry.user_id, key);
        self.by_key.insert(key, entry);
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<WaitingEntry> {
        let key = self.index.remove(&user_id)?;
        self.by_key.remove(&key)
    }

    /// Ordered snapshot of the current entries, ascending by `(rating, joined_at)`.
    pub fn ordered(&self) -> Vec<&WaitingEntry> {
        self.by_key.values().collect()
    }

    /// Runs the pairing scan (spec §4.3) and removes paired entries from the pool,
    /// returning the paired entries. The trailing unpaired entry, if any, is left in
    /// the pool. `tolerance_slope` is rating-points of tolerance per second of wait.
    ///
    /// Per the open question in the design notes, `wait` is computed as "the longer of
    /// the two waits", i.e. `now - min(p1.joined_at, p2.joined_at)`.
    pub fn pairing_scan(
        &mut self,
        now: Instant,
        tolerance_slope: f64,
    ) -> Vec<(WaitingEntry, WaitingEntry)> {
        let ordered: Vec<UserId> = self.by_key.values().map(|e| e.user_id).collect();
        let mut pairs = Vec::new();
        let mut i = 0usize;

        while i + 1 < ordered.len() {
            let p1_id = ordered[i];
            let p2_id = ordered[i + 1];

            let (p1_rating, p1_joined) = {
                let e = self.get(p1_id).expect("entry present during scan");
                (e.rating, e.joined_at)
            };
            let (p2_rating, p2_joined) = {
                let e = self.get(p2_id).expect("entry present during scan");
                (e.rating, e.joined_at)
            };

            let longer_wait = now
                .saturating_duration_since(p1_joined.min(p2_joined))
                .as_secs_f64();
            let tolerance = tolerance_slope * longer_wait;
            let gap = (p2_rating - p1_rating).abs();

            if gap < tolerance {
                let p1 = self.remove(p1_id).expect("p1 present during scan");
                let p2 = self.remove(p2_id).expect("p2 present during scan");
                pairs.push((p1, p2));
                i += 2;
            } else {
                i += 1;
            }
        }

        pairs
    }

    fn get(&self, user_id: UserId) -> Option<&WaitingEntry> {
        let key = self.index.get(&user_id)?;
        self.by_key.get(key)
    }
}

impl Default for WaitingPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn dummy_channel() -> DuelChannel {
        let (tx, _rx) = mpsc::channel(8);
        DuelChannel::new(tx)
    }

    fn entry(user_id: UserId, rating: f64, joined_at: Instant) -> WaitingEntry {
        WaitingEntry {
            user_id,
            rating,
            joined_at,
            channel_ref: dummy_channel(),
        }
    }

    #[test]
    fn ordered_by_rating_then_joined_at() {
        let mut pool = WaitingPool::new();
        let t0 = Instant::now();
        pool.insert(entry(1, 1050.0, t0));
        pool.insert(entry(2, 1000.0, t0 + Duration::from_millis(1)));
        pool.insert(entry(3, 1000.0, t0));

        let ordered: Vec<UserId> = pool.ordered().into_iter().map(|e| e.user_id).collect();
        assert_eq!(ordered, vec![3, 2, 1]);
    }

    #[test]
    fn duplicate_user_id_is_rejected() {
        let mut pool = WaitingPool::new();
        let t0 = Instant::now();
        pool.insert(entry(1, 1000.0, t0));
        pool.insert(entry(1, 1500.0, t0));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.ordered()[0].rating, 1000.0);
    }

    #[test]
    fn fast_pairing_scenario() {
        // Scenario 1: ratings 1000 and 1050 join within one second; paired once
        // the gap of 50 is covered by 50 * wait, i.e. once wait >= 1s.
        let mut pool = WaitingPool::new();
        let t0 = Instant::now();
        pool.insert(entry(1, 1000.0, t0));
        pool.insert(entry(2, 1050.0, t0 + Duration::from_millis(500)));

        let pairs = pool.pairing_scan(t0 + Duration::from_millis(500), 50.0);
        assert!(pairs.is_empty(), "gap 50 should not clear tolerance at wait=0.5s (25)");

        let pairs = pool.pairing_scan(t0 + Duration::from_secs(2), 50.0);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn tolerance_growth_scenario() {
        // Scenario 2: A (1000) waits alone for 5s; B (1400) joins. Gap 400.
        let mut pool = WaitingPool::new();
        let t0 = Instant::now();
        pool.insert(entry(1, 1000.0, t0));
        let b_joined = t0 + Duration::from_secs(5);
        pool.insert(entry(2, 1400.0, b_joined));

        // At total wait 8s (3s after B joins): 400 < 50*8=400 is false (strict <).
        let pairs = pool.pairing_scan(t0 + Duration::from_secs(8), 50.0);
        assert!(pairs.is_empty());

        // At wait 9s: 400 < 450 -> paired.
        let pairs = pool.pairing_scan(t0 + Duration::from_secs(9), 50.0);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn pairing_monotonicity_law() {
        // Widening either participant's wait (holding ratings constant) only widens
        // the admissible gap, never narrows it.
        let mut pool = WaitingPool::new();
        let t0 = Instant::now();
        pool.insert(entry(1, 1000.0, t0));
        pool.insert(entry(2, 1300.0, t0));

        let narrow = pool.pairing_scan(t0 + Duration::from_secs(3), 50.0);
        assert!(narrow.is_empty());

        // Same state, but scanned further in the future (simulating a longer wait):
        let mut pool2 = WaitingPool::new();
        pool2.insert(entry(1, 1000.0, t0));
        pool2.insert(entry(2, 1300.0, t0));
        let wide = pool2.pairing_scan(t0 + Duration::from_secs(7), 50.0);
        assert_eq!(wide.len(), 1);
    }

    #[test]
    fn trailing_unpaired_entry_remains() {
        let mut pool = WaitingPool::new();
        let t0 = Instant::now();
        pool.insert(entry(1, 1000.0, t0));
        pool.insert(entry(2, 1001.0, t0));
        pool.insert(entry(3, 5000.0, t0));

        let pairs = pool.pairing_scan(t0 + Duration::from_secs(1), 50.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(3));
    }
}
