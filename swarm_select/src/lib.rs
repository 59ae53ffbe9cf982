//! Piece selection (§4.3): decides which blocks to request next, given
//! piece priorities, peer availability, and pipeline depth.

#[macro_use]
extern crate error_chain;

pub mod error;

mod block;
mod picker;

pub use crate::block::{blocks_in_piece, BlockInfo, BLOCK_SIZE};
pub use crate::picker::{PieceSelector, SelectorSettings, DEFAULT_PRIORITY};
