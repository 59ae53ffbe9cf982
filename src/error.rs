//! Top-level errors for the swarm controller (§7's taxonomy, as it
//! applies to the orchestration layer rather than any one subsystem).

use swarm_disk::error::DiskError;
use swarm_handshake::error::HandshakeError;
use swarm_metainfo::error::ParseError;
use swarm_peer::error::PeerError;
use swarm_select::error::SelectError;

error_chain! {
    types {
        SwarmError, SwarmErrorKind, SwarmResultExt, SwarmResult;
    }

    foreign_links {
        Bencode(serde_bencode::Error);
        Disk(DiskError);
        Handshake(HandshakeError);
        Parse(ParseError);
        Peer(PeerError);
        Select(SelectError);
    }

    errors {
        UnknownSetting {
            name: String
        } {
            description("no such setting is registered")
            display("unknown setting: {}", name)
        }
        SettingTypeMismatch {
            name: String,
            expected: &'static str
        } {
            description("setting value does not match its declared type")
            display("setting {} is not a {}", name, expected)
        }
        ConnectionsExhausted {
            limit: usize
        } {
            description("the swarm's connection cap is already reached")
            display("connection limit of {} reached", limit)
        }
        PerIpLimitReached {
            addr: std::net::IpAddr,
            limit: usize
        } {
            description("a single peer IP exceeded its connection cap")
            display("{} already has {} connections open", addr, limit)
        }
        Filtered {
            addr: std::net::IpAddr
        } {
            description("peer address is rejected by the configured IP filter")
            display("{} is rejected by the ip filter", addr)
        }
        TrackerFailed {
            tier: usize,
            reason: String
        } {
            description("every tracker in an announce tier failed")
            display("tier {} exhausted: {}", tier, reason)
        }
        SwarmErrored {
            reason: String
        } {
            description("the swarm has moved to the terminal error state")
            display("swarm errored: {}", reason)
        }
        InvalidStateTransition {
            from: &'static str,
            to: &'static str
        } {
            description("torrent state machine transition is not allowed from the current state")
            display("cannot transition from {} to {}", from, to)
        }
    }
}
