//! Disk job descriptions and completions (§3 "Disk job").

use swarm_metainfo::{Metainfo, ResumeData};

use crate::error::DiskError;
use crate::token::{JobToken, StorageId};

/// Priority band a job is submitted under; higher values skip ahead of
/// lower ones in the queue (§4.2 Queue discipline).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

impl Priority {
    pub const NORMAL: Priority = Priority(0);
    pub const HIGH: Priority = Priority(1);
}

impl Default for Priority {
    fn default() -> Priority {
        Priority::NORMAL
    }
}

/// The operation half of a disk job; carries everything needed besides
/// the routing fields (`storage`/`priority`/`token`) that `DiskJob` adds.
pub enum JobKind {
    Read {
        piece: u64,
        offset: u64,
        length: usize,
    },
    Write {
        piece: u64,
        offset: u64,
        buffer: Vec<u8>,
    },
    Hash {
        piece: u64,
    },
    MoveStorage {
        new_root: std::path::PathBuf,
    },
    RenameFile {
        file_index: usize,
        new_path: std::path::PathBuf,
    },
    ReleaseFiles,
    DeleteFiles,
    CheckFastresume {
        resume: ResumeData,
    },
    CheckFiles,
    ClearPiece {
        piece: u64,
    },
    UpdateSettings {
        settings: ManagerSettings,
    },
}

/// Runtime-tunable manager settings (§4.2/§4.6), applied via the
/// `update_settings` job so changes go through the same ordering as any
/// other job rather than racing the worker thread.
#[derive(Clone, Debug)]
pub struct ManagerSettings {
    pub cache_size_blocks: usize,
    pub cache_expiry: std::time::Duration,
    pub reorder_enabled: bool,
}

impl Default for ManagerSettings {
    fn default() -> ManagerSettings {
        ManagerSettings {
            cache_size_blocks: 2048,
            cache_expiry: std::time::Duration::from_secs(60),
            reorder_enabled: true,
        }
    }
}

/// An immutable disk job description, as named in §3.
pub struct DiskJob {
    pub token: JobToken,
    pub storage: StorageId,
    pub priority: Priority,
    pub kind: JobKind,
}

/// A message registering a new storage with the manager, analogous to the
/// `AddTorrent`/`RemoveTorrent` messages of the message-passing idiom this
/// manager's worker loop follows.
pub enum ManagerRequest {
    AddStorage { storage: StorageId, metainfo: Metainfo, root: std::path::PathBuf },
    RemoveStorage { storage: StorageId },
    Job(DiskJob),
    Shutdown,
}

/// What a completed (or failed) job reports back to the caller's executor.
pub enum Completion {
    ReadDone { token: JobToken, storage: StorageId, buffer: Vec<u8> },
    WriteDone { token: JobToken, storage: StorageId },
    HashDone { token: JobToken, storage: StorageId, piece: u64, matched: bool },
    MoveStorageDone { token: JobToken, storage: StorageId },
    RenameFileDone { token: JobToken, storage: StorageId },
    ReleaseFilesDone { token: JobToken, storage: StorageId },
    DeleteFilesDone { token: JobToken, storage: StorageId },
    CheckFastresumeDone { token: JobToken, storage: StorageId, matched: bool },
    CheckFilesDone { token: JobToken, storage: StorageId, good_pieces: Vec<u64> },
    ClearPieceDone { token: JobToken, storage: StorageId },
    UpdateSettingsDone { token: JobToken, storage: StorageId },
    StorageAdded { storage: StorageId },
    StorageRemoved { storage: StorageId },
    JobFailed { token: JobToken, storage: StorageId, error: DiskError },
}
