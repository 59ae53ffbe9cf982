//! The disk I/O subsystem (§4.2): a worker thread owning registered
//! storages, a write-back block cache, and an elevator-ordered job queue,
//! talked to through message passing rather than a shared lock.

#[macro_use]
extern crate error_chain;

pub mod error;

mod cache;
mod job;
mod manager;
mod queue;
mod token;

pub use crate::job::{Completion, DiskJob, JobKind, ManagerRequest, ManagerSettings, Priority};
pub use crate::manager::DiskManager;
pub use crate::token::{JobToken, JobTokenGenerator, StorageId, StorageIdGenerator};
