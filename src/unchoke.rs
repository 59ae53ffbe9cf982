//! The unchoke scheduler (§4.5 "Unchoke scheduler"): ranks peers by
//! download-rate reciprocation and unchokes the top `unchoke_slots_limit`,
//! with one optimistic slot rotated every `optimistic_unchoke_interval`.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use swarm_util::bt::PeerId;

/// Ranks and rotates which peers get an unchoke slot. Holds no peer
/// state of its own beyond the rotation order and the currently-chosen
/// optimistic peer; the caller supplies fresh download rates each tick.
pub struct UnchokeScheduler {
    slots_limit: usize,
    optimistic_interval: Duration,
    last_rotation: Option<Instant>,
    rotation_order: Vec<PeerId>,
    rotation_index: usize,
    current_optimistic: Option<PeerId>,
}

impl UnchokeScheduler {
    pub fn new(slots_limit: usize, optimistic_interval: Duration) -> UnchokeScheduler {
        UnchokeScheduler {
            slots_limit,
            optimistic_interval,
            last_rotation: None,
            rotation_order: Vec::new(),
            rotation_index: 0,
            current_optimistic: None,
        }
    }

    /// Register a peer in the round-robin-without-repeat rotation used
    /// to pick the optimistic slot. A no-op if already known.
    pub fn note_peer(&mut self, peer: PeerId) {
        if !self.rotation_order.contains(&peer) {
            self.rotation_order.push(peer);
        }
    }

    /// Drop a disconnected peer from the rotation.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.rotation_order.retain(|&candidate| candidate != peer);
        if self.current_optimistic == Some(peer) {
            self.current_optimistic = None;
        }
    }

    /// Recompute the unchoke set given each connected peer's current
    /// download rate (bytes/sec, as measured from that peer to us).
    pub fn select_unchoked(&mut self, rates: &[(PeerId, f64)], now: Instant) -> HashSet<PeerId> {
        for &(peer, _) in rates {
            self.note_peer(peer);
        }

        let connected: HashSet<PeerId> = rates.iter().map(|&(peer, _)| peer).collect();

        let rotation_due = match self.last_rotation {
            None => true,
            Some(last) => now.duration_since(last) >= self.optimistic_interval,
        };
        let optimistic_still_connected = self.current_optimistic.map_or(false, |peer| connected.contains(&peer));

        if rotation_due || !optimistic_still_connected {
            self.rotate_optimistic(&connected);
            self.last_rotation = Some(now);
        }

        let mut sorted = rates.to_vec();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let regular_slots = self.slots_limit.saturating_sub(self.current_optimistic.is_some() as usize);

        let mut chosen: HashSet<PeerId> = sorted
            .iter()
            .filter(|&&(peer, _)| Some(peer) != self.current_optimistic)
            .take(regular_slots)
            .map(|&(peer, _)| peer)
            .collect();

        if let Some(optimistic) = self.current_optimistic {
            chosen.insert(optimistic);
        }

        chosen
    }

    fn rotate_optimistic(&mut self, connected: &HashSet<PeerId>) {
        let len = self.rotation_order.len();
        if len == 0 {
            self.current_optimistic = None;
            return;
        }

        for step in 1..=len {
            let index = (self.rotation_index + step) % len;
            let candidate = self.rotation_order[index];
            if connected.contains(&candidate) {
                self.rotation_index = index;
                self.current_optimistic = Some(candidate);
                return;
            }
        }

        self.current_optimistic = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        PeerId::from([byte; 20])
    }

    #[test]
    fn positive_top_rate_peers_are_unchoked() {
        let mut scheduler = UnchokeScheduler::new(2, Duration::from_secs(30));
        let rates = vec![(peer(1), 100.0), (peer(2), 50.0), (peer(3), 10.0)];

        let chosen = scheduler.select_unchoked(&rates, Instant::now());
        // One regular slot (rate-ranked) plus one optimistic slot.
        assert!(chosen.contains(&peer(1)));
        assert_eq!(chosen.len(), 2);
    }

    #[test]
    fn positive_optimistic_slot_rotates_after_interval() {
        let mut scheduler = UnchokeScheduler::new(1, Duration::from_millis(10));
        let rates = vec![(peer(1), 100.0), (peer(2), 50.0)];

        let start = Instant::now();
        let first = scheduler.select_unchoked(&rates, start);

        let second = scheduler.select_unchoked(&rates, start + Duration::from_millis(20));
        assert_ne!(first, second, "optimistic slot should rotate to the other peer");
    }

    #[test]
    fn negative_disconnected_peer_is_dropped_from_optimistic() {
        let mut scheduler = UnchokeScheduler::new(1, Duration::from_secs(60));
        scheduler.note_peer(peer(1));
        let first = scheduler.select_unchoked(&[(peer(1), 10.0)], Instant::now());
        assert!(first.contains(&peer(1)));

        scheduler.forget_peer(peer(1));
        let second = scheduler.select_unchoked(&[(peer(2), 5.0)], Instant::now());
        assert!(second.contains(&peer(2)));
        assert!(!second.contains(&peer(1)));
    }
}
