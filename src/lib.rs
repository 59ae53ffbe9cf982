//! The swarm engine: the glue crate that owns a torrent's piece picker,
//! storage handle, tracker announce loop, connection admission, and
//! unchoke scheduler (§4.5), plus the settings/counters ambient stack
//! (§4.6). The wire-level crates (`swarm_handshake`, `swarm_peer`),
//! the piece picker (`swarm_select`), and the disk/storage layers
//! (`swarm_disk`, `swarm_storage`) are reused as published libraries.

#[macro_use]
extern crate error_chain;

pub mod error;

mod admission;
mod controller;
mod counters;
mod settings;
mod tracker;
mod unchoke;

pub use crate::admission::{AllowAll, ConnectionAdmission, IpFilter, PeerIdRegistry};
pub use crate::controller::{PieceHashOutcome, TorrentController, TorrentState};
pub use crate::counters::{Counters, CountersSnapshot};
pub use crate::settings::{Settings, SettingValue};
pub use crate::tracker::{AnnounceEvent, AnnounceList, AnnounceOutcome, AnnounceRequest, AnnounceResponse, PeerEndpoint, Tracker};
pub use crate::unchoke::UnchokeScheduler;

pub use swarm_disk::{DiskManager, ManagerSettings};
pub use swarm_handshake::{initiate_handshake, complete_inbound_handshake, HandshakerConfig};
pub use swarm_metainfo::{Metainfo, ResumeData};
pub use swarm_peer::{Message, PeerConnection, PieceGeometry};
pub use swarm_select::{PieceSelector, SelectorSettings};
pub use swarm_storage::TorrentStorage;
