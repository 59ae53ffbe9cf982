//! Fixed-index atomic counters (§4.6): cheap to bump from either the
//! executor or a disk worker thread, snapshotted periodically for
//! observers as `post_session_stats`.

use std::sync::atomic::{AtomicI64, Ordering};

/// Stable index/name pairs. Appending a new counter is backward
/// compatible; reordering or removing one is not (names are part of
/// the snapshot's public contract, per §6 "names are stable across
/// releases").
macro_rules! counters {
    ($($index:expr => $konst:ident = $name:expr),+ $(,)?) => {
        $(pub const $konst: usize = $index;)+

        const NAMES: &[&str] = &[$($name),+];
        const COUNT: usize = NAMES.len();
    };
}

counters! {
    0 => DOWNLOADED_BYTES = "downloaded_bytes",
    1 => UPLOADED_BYTES = "uploaded_bytes",
    2 => PIECES_VERIFIED = "pieces_verified",
    3 => PIECES_FAILED = "pieces_failed",
    4 => PEERS_CONNECTED = "peers_connected",
    5 => PEERS_DISCONNECTED = "peers_disconnected",
    6 => REQUESTS_TIMED_OUT = "requests_timed_out",
    7 => TRACKER_ANNOUNCES_OK = "tracker_announces_ok",
    8 => TRACKER_ANNOUNCES_FAILED = "tracker_announces_failed",
}

/// A snapshot of every counter at one instant, as emitted by
/// `post_session_stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountersSnapshot {
    pub version: u32,
    pub values: Vec<(&'static str, i64)>,
}

/// The live counters array. Safe to read and update concurrently from
/// multiple threads; no lock is ever taken.
pub struct Counters {
    values: [AtomicI64; COUNT],
    version: u32,
}

impl Counters {
    pub fn new() -> Counters {
        Counters { values: Default::default(), version: 1 }
    }

    pub fn add(&self, index: usize, delta: i64) {
        self.values[index].fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, index: usize, value: i64) {
        self.values[index].store(value, Ordering::Relaxed);
    }

    pub fn get(&self, index: usize) -> i64 {
        self.values[index].load(Ordering::Relaxed)
    }

    /// Build a `post_session_stats` snapshot of every counter.
    pub fn snapshot(&self) -> CountersSnapshot {
        let values = NAMES
            .iter()
            .enumerate()
            .map(|(index, &name)| (name, self.get(index)))
            .collect();

        CountersSnapshot { version: self.version, values }
    }
}

impl Default for Counters {
    fn default() -> Counters {
        Counters::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_add_and_set_are_visible_in_snapshot() {
        let counters = Counters::new();
        counters.add(DOWNLOADED_BYTES, 16 * 1024);
        counters.add(DOWNLOADED_BYTES, 16 * 1024);
        counters.set(PEERS_CONNECTED, 3);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.values[DOWNLOADED_BYTES], ("downloaded_bytes", 32 * 1024));
        assert_eq!(snapshot.values[PEERS_CONNECTED], ("peers_connected", 3));
    }

    #[test]
    fn positive_snapshot_names_are_stable_and_complete() {
        let counters = Counters::new();
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.values.len(), COUNT);
        assert_eq!(snapshot.values[TRACKER_ANNOUNCES_FAILED].0, "tracker_announces_failed");
    }
}
