//! The tracker interface (§6 "Tracker request") and the tiered announce
//! loop that drives it (§4.5 "Announce loop"). The wire transport
//! (HTTP/UDP/DHT) is an external collaborator; this module only defines
//! the opaque request/response shapes and the scheduling policy around
//! them.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use swarm_util::bt::{InfoHash, PeerId};

/// `event` field of an announce request (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
    None,
}

/// An opaque announce request, as emitted to a tracker transport (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub ip: Option<std::net::IpAddr>,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: AnnounceEvent,
    pub num_want: Option<u32>,
    pub key: u32,
    pub tracker_id: Option<String>,
}

/// A peer endpoint as handed back in an announce response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub addr: std::net::SocketAddr,
}

/// An opaque announce response, as consumed from a tracker transport (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub interval: Duration,
    pub min_interval: Option<Duration>,
    pub tracker_id: Option<String>,
    pub complete: u32,
    pub incomplete: u32,
    pub peers: Vec<PeerEndpoint>,
}

/// One tracker transport. Implemented outside this crate for each
/// concrete protocol (HTTP, UDP, DHT); this core only calls through the
/// trait (§1 "the tracker wire formats... are external collaborators").
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse, String>;
}

/// One tracker within a tier, with its own failure bookkeeping so a
/// repeatedly-failing tracker sinks to the back of its tier.
struct TierEntry {
    tracker: Box<dyn Tracker>,
    consecutive_failures: u32,
}

/// A list of tracker tiers (§4.5: announce to the lowest-tier working
/// tracker, falling back within the tier then to the next tier).
pub struct AnnounceList {
    tiers: Vec<Vec<TierEntry>>,
    min_announce_interval: Duration,
    last_announce: Option<Instant>,
}

/// Outcome of one `announce_once` call, for the caller to log/act on.
pub enum AnnounceOutcome {
    Ok { tier: usize, response: AnnounceResponse },
    AllTiersFailed,
    TooSoon,
}

impl AnnounceList {
    pub fn new(min_announce_interval: Duration) -> AnnounceList {
        AnnounceList { tiers: Vec::new(), min_announce_interval, last_announce: None }
    }

    /// Append a tier of trackers, tried together before the next tier
    /// is attempted.
    pub fn add_tier(&mut self, trackers: Vec<Box<dyn Tracker>>) {
        let entries = trackers.into_iter().map(|tracker| TierEntry { tracker, consecutive_failures: 0 }).collect();
        self.tiers.push(entries);
    }

    pub fn num_tiers(&self) -> usize {
        self.tiers.len()
    }

    /// Announce to the lowest-tier tracker that still answers,
    /// reordering a tier so a working tracker moves to the front of it
    /// (BEP 12-style). Honors `min_announce_interval` by returning
    /// `TooSoon` rather than re-announcing early.
    pub async fn announce_once(&mut self, request: &AnnounceRequest, now: Instant) -> AnnounceOutcome {
        if let Some(last) = self.last_announce {
            if now.duration_since(last) < self.min_announce_interval {
                return AnnounceOutcome::TooSoon;
            }
        }

        for (tier_index, tier) in self.tiers.iter_mut().enumerate() {
            for position in 0..tier.len() {
                match tier[position].tracker.announce(request).await {
                    Ok(response) => {
                        tier[position].consecutive_failures = 0;
                        if position != 0 {
                            let entry = tier.remove(position);
                            tier.insert(0, entry);
                        }
                        self.last_announce = Some(now);
                        return AnnounceOutcome::Ok { tier: tier_index, response };
                    }
                    Err(_) => {
                        tier[position].consecutive_failures += 1;
                    }
                }
            }
        }

        self.last_announce = Some(now);
        AnnounceOutcome::AllTiersFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request() -> AnnounceRequest {
        AnnounceRequest {
            info_hash: InfoHash::from([0u8; 20]),
            peer_id: PeerId::from([1u8; 20]),
            ip: None,
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: AnnounceEvent::Started,
            num_want: None,
            key: 0,
            tracker_id: None,
        }
    }

    fn response() -> AnnounceResponse {
        AnnounceResponse {
            interval: Duration::from_secs(1800),
            min_interval: None,
            tracker_id: None,
            complete: 1,
            incomplete: 0,
            peers: Vec::new(),
        }
    }

    struct FailingTracker {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tracker for FailingTracker {
        async fn announce(&self, _request: &AnnounceRequest) -> Result<AnnounceResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("connection refused".to_owned())
        }
    }

    struct WorkingTracker;

    #[async_trait]
    impl Tracker for WorkingTracker {
        async fn announce(&self, _request: &AnnounceRequest) -> Result<AnnounceResponse, String> {
            Ok(response())
        }
    }

    #[tokio::test]
    async fn positive_falls_back_within_tier() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut list = AnnounceList::new(Duration::from_secs(0));
        list.add_tier(vec![
            Box::new(FailingTracker { calls: Arc::clone(&calls) }) as Box<dyn Tracker>,
            Box::new(WorkingTracker) as Box<dyn Tracker>,
        ]);

        let outcome = list.announce_once(&request(), Instant::now()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match outcome {
            AnnounceOutcome::Ok { tier, .. } => assert_eq!(tier, 0),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn positive_falls_back_to_next_tier() {
        let mut list = AnnounceList::new(Duration::from_secs(0));
        list.add_tier(vec![Box::new(FailingTracker { calls: Arc::new(AtomicUsize::new(0)) })]);
        list.add_tier(vec![Box::new(WorkingTracker)]);

        let outcome = list.announce_once(&request(), Instant::now()).await;
        match outcome {
            AnnounceOutcome::Ok { tier, .. } => assert_eq!(tier, 1),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn negative_too_soon_skips_announce() {
        let mut list = AnnounceList::new(Duration::from_secs(60));
        list.add_tier(vec![Box::new(WorkingTracker)]);

        let first = list.announce_once(&request(), Instant::now()).await;
        assert!(matches!(first, AnnounceOutcome::Ok { .. }));

        let second = list.announce_once(&request(), Instant::now()).await;
        assert!(matches!(second, AnnounceOutcome::TooSoon));
    }
}
