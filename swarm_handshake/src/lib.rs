//! Connection establishment and the BitTorrent handshake (§4.4).

#[macro_use]
extern crate error_chain;

pub mod error;

mod config;
mod extensions;
mod handshaker;
mod message;
mod protocol;

pub use crate::config::HandshakerConfig;
pub use crate::extensions::{Extension, Extensions, NUM_EXTENSION_BYTES};
pub use crate::handshaker::{complete_inbound_handshake, initiate_handshake};
pub use crate::message::{CompleteMessage, InitiateMessage};
pub use crate::protocol::Protocol;

pub use swarm_util::bt::{InfoHash, PeerId};
