//! Connection admission (§4.5 "Connection admission"): per-IP and
//! per-swarm connection caps, a pluggable IP filter, and the
//! duplicate-peer-id registry consulted during handshake completion.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::IpAddr;

use swarm_util::bt::PeerId;

use crate::error::{SwarmErrorKind, SwarmResult};

/// A configurable reject/allow policy for inbound or outbound peer
/// addresses, consulted before any counting against the caps below.
pub trait IpFilter: Send + Sync {
    fn allows(&self, addr: IpAddr) -> bool;
}

/// The default filter: every address is allowed.
pub struct AllowAll;

impl IpFilter for AllowAll {
    fn allows(&self, _addr: IpAddr) -> bool {
        true
    }
}

/// Tracks live connection counts and admits or rejects new ones
/// against `connections_limit`/`limit_per_ip` (§4.5).
pub struct ConnectionAdmission {
    filter: Box<dyn IpFilter>,
    connections_limit: usize,
    limit_per_ip: usize,
    total: usize,
    per_ip: HashMap<IpAddr, usize>,
}

impl ConnectionAdmission {
    pub fn new(connections_limit: usize, limit_per_ip: usize) -> ConnectionAdmission {
        ConnectionAdmission {
            filter: Box::new(AllowAll),
            connections_limit,
            limit_per_ip,
            total: 0,
            per_ip: HashMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn IpFilter>) -> ConnectionAdmission {
        self.filter = filter;
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn per_ip_count(&self, addr: IpAddr) -> usize {
        self.per_ip.get(&addr).copied().unwrap_or(0)
    }

    /// Admit one connection from `addr`, or reject it with the reason.
    /// On success the caller must later call [`release`](Self::release)
    /// when that connection closes.
    pub fn admit(&mut self, addr: IpAddr) -> SwarmResult<()> {
        if !self.filter.allows(addr) {
            return Err(SwarmErrorKind::Filtered { addr }.into());
        }
        if self.total >= self.connections_limit {
            return Err(SwarmErrorKind::ConnectionsExhausted { limit: self.connections_limit }.into());
        }
        let count = self.per_ip.entry(addr).or_insert(0);
        if *count >= self.limit_per_ip {
            return Err(SwarmErrorKind::PerIpLimitReached { addr, limit: self.limit_per_ip }.into());
        }

        *count += 1;
        self.total += 1;
        Ok(())
    }

    pub fn release(&mut self, addr: IpAddr) {
        if let Some(count) = self.per_ip.get_mut(&addr) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_ip.remove(&addr);
            }
        }
        self.total = self.total.saturating_sub(1);
    }
}

/// Tracks which peer ids already have a live connection to this swarm,
/// so a second inbound or outbound connection for the same peer id is
/// rejected during handshake completion (§4.4 receive FSM:
/// `read_peer_id -> read_msg_len` duplicate-peer check).
#[derive(Default)]
pub struct PeerIdRegistry {
    attached: HashSet<PeerId>,
}

impl PeerIdRegistry {
    pub fn new() -> PeerIdRegistry {
        PeerIdRegistry::default()
    }

    pub fn is_attached(&self, peer_id: &PeerId) -> bool {
        self.attached.contains(peer_id)
    }

    /// Attach `peer_id`, returning `false` if it was already attached
    /// (the caller should reject the new connection in that case).
    pub fn attach(&mut self, peer_id: PeerId) -> bool {
        self.attached.insert(peer_id)
    }

    pub fn detach(&mut self, peer_id: &PeerId) {
        self.attached.remove(peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(octet: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, octet))
    }

    #[test]
    fn positive_admits_up_to_the_per_ip_limit() {
        let mut admission = ConnectionAdmission::new(100, 2);
        assert!(admission.admit(addr(1)).is_ok());
        assert!(admission.admit(addr(1)).is_ok());
        assert!(admission.admit(addr(1)).is_err());
        assert_eq!(admission.per_ip_count(addr(1)), 2);
    }

    #[test]
    fn positive_release_frees_a_slot() {
        let mut admission = ConnectionAdmission::new(100, 1);
        admission.admit(addr(1)).unwrap();
        admission.release(addr(1));
        assert!(admission.admit(addr(1)).is_ok());
    }

    #[test]
    fn negative_total_cap_is_enforced_across_ips() {
        let mut admission = ConnectionAdmission::new(1, 10);
        admission.admit(addr(1)).unwrap();
        assert!(admission.admit(addr(2)).is_err());
    }

    #[test]
    fn negative_filtered_address_is_rejected_before_counting() {
        struct DenyAll;
        impl IpFilter for DenyAll {
            fn allows(&self, _addr: IpAddr) -> bool {
                false
            }
        }

        let mut admission = ConnectionAdmission::new(100, 100).with_filter(Box::new(DenyAll));
        assert!(admission.admit(addr(1)).is_err());
        assert_eq!(admission.total(), 0);
    }

    fn peer_id(byte: u8) -> PeerId {
        PeerId::from([byte; 20])
    }

    #[test]
    fn positive_second_attach_of_same_peer_id_is_rejected() {
        let mut registry = PeerIdRegistry::new();
        assert!(registry.attach(peer_id(1)));
        assert!(!registry.attach(peer_id(1)));
        assert!(registry.is_attached(&peer_id(1)));
    }

    #[test]
    fn positive_detach_allows_reattach() {
        let mut registry = PeerIdRegistry::new();
        registry.attach(peer_id(1));
        registry.detach(&peer_id(1));
        assert!(!registry.is_attached(&peer_id(1)));
        assert!(registry.attach(peer_id(1)));
    }
}
