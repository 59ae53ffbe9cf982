//! The disk manager: a worker thread that owns every registered storage,
//! the write-back cache, and the elevator job queue, and exchanges
//! [`ManagerRequest`]/[`Completion`] messages with callers over
//! `crossbeam-channel` (§4.2, §5 "one executor thread + a small pool of
//! disk worker threads").

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};

use swarm_storage::fs::NativeFileSystem;
use swarm_storage::TorrentStorage;
use swarm_util::sha::ShaHash;

use crate::cache::BlockCache;
use crate::error::DiskErrorKind;
use crate::job::{Completion, DiskJob, JobKind, ManagerRequest, ManagerSettings};
use crate::queue::JobQueue;
use crate::token::StorageId;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running disk manager. Dropping it requests a clean
/// shutdown and joins the worker thread.
pub struct DiskManager {
    requests: Sender<ManagerRequest>,
    completions: Receiver<Completion>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DiskManager {
    pub fn new(settings: ManagerSettings) -> DiskManager {
        let (request_tx, request_rx) = unbounded();
        let (completion_tx, completion_rx) = unbounded();

        let worker = thread::spawn(move || run_worker(request_rx, completion_tx, settings));

        DiskManager {
            requests: request_tx,
            completions: completion_rx,
            worker: Some(worker),
        }
    }

    /// A cloneable sender callers use to submit requests.
    pub fn sender(&self) -> Sender<ManagerRequest> {
        self.requests.clone()
    }

    /// The receiver callers poll (or select on) for completions.
    pub fn completions(&self) -> &Receiver<Completion> {
        &self.completions
    }

    pub fn submit(&self, request: ManagerRequest) {
        // The worker only ever disconnects after processing a Shutdown
        // request, at which point no caller should still be submitting.
        let _ = self.requests.send(request);
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.requests.send(ManagerRequest::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

type Storages = HashMap<StorageId, TorrentStorage<NativeFileSystem>>;

fn run_worker(requests: Receiver<ManagerRequest>, completions: Sender<Completion>, settings: ManagerSettings) {
    let mut storages: Storages = HashMap::new();
    let mut cache = BlockCache::new(settings.cache_size_blocks, settings.cache_expiry);
    let mut queue = JobQueue::new(settings.reorder_enabled);

    'outer: loop {
        loop {
            match requests.try_recv() {
                Ok(request) => {
                    if handle_request(request, &mut storages, &mut cache, &mut queue, &completions) {
                        break 'outer;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        if let Some(job) = queue.pop() {
            process_job(job, &mut storages, &mut cache, &completions);
            evict_over_capacity(&mut cache, &storages);
            continue;
        }

        match requests.recv_timeout(IDLE_SWEEP_INTERVAL) {
            Ok(request) => {
                if handle_request(request, &mut storages, &mut cache, &mut queue, &completions) {
                    break 'outer;
                }
            }
            Err(RecvTimeoutError::Timeout) => sweep_expired(&mut cache, &storages),
            Err(RecvTimeoutError::Disconnected) => break 'outer,
        }
    }

    debug!("disk manager worker shutting down");
}

/// Handle one non-job request. Returns `true` if the worker should stop.
fn handle_request(
    request: ManagerRequest,
    storages: &mut Storages,
    cache: &mut BlockCache,
    queue: &mut JobQueue,
    completions: &Sender<Completion>,
) -> bool {
    match request {
        ManagerRequest::AddStorage { storage, metainfo, root } => {
            storages.insert(storage, TorrentStorage::native(&metainfo, &root));
            let _ = completions.send(Completion::StorageAdded { storage });
            false
        }
        ManagerRequest::RemoveStorage { storage } => {
            if let Some(s) = storages.remove(&storage) {
                s.release_files();
            }
            for key in cache.keys_for_storage(storage) {
                cache.discard(key);
            }
            let _ = completions.send(Completion::StorageRemoved { storage });
            false
        }
        ManagerRequest::Job(job) => {
            queue.push(job);
            false
        }
        ManagerRequest::Shutdown => true,
    }
}

fn process_job(job: DiskJob, storages: &mut Storages, cache: &mut BlockCache, completions: &Sender<Completion>) {
    let DiskJob { token, storage: storage_id, kind, .. } = job;

    let storage = match storages.get(&storage_id) {
        Some(s) => s,
        None => {
            let error = DiskErrorKind::StorageNotFound { storage: storage_id.0 }.into();
            let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error });
            return;
        }
    };

    match kind {
        JobKind::Read { piece, offset, length } => {
            let key = (storage_id, piece);
            if let Some(buffer) = cache.read(key, offset, length) {
                let _ = completions.send(Completion::ReadDone { token, storage: storage_id, buffer });
                return;
            }

            let mut buffer = vec![0u8; length];
            match storage.readv(piece, offset, &mut buffer) {
                Ok(()) => {
                    let _ = completions.send(Completion::ReadDone { token, storage: storage_id, buffer });
                }
                Err(error) => {
                    let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
                }
            }
        }

        JobKind::Write { piece, offset, buffer } => {
            let piece_len = storage.info().piece_size(piece as usize);
            let key = (storage_id, piece);

            if cache.insert_block(key, offset, buffer, piece_len) {
                if let Some(bytes) = cache.take(key) {
                    if let Err(error) = storage.writev(piece, 0, &bytes) {
                        let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
                        return;
                    }
                }
            }

            let _ = completions.send(Completion::WriteDone { token, storage: storage_id });
        }

        JobKind::Hash { piece } => {
            let key = (storage_id, piece);
            if let Some(blocks) = cache.take_blocks(key) {
                for (block_offset, block) in blocks {
                    if let Err(error) = storage.writev(piece, block_offset, &block) {
                        let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
                        return;
                    }
                }
            }

            match hash_piece(storage, piece) {
                Ok(matched) => {
                    let _ = completions.send(Completion::HashDone { token, storage: storage_id, piece, matched });
                }
                Err(error) => {
                    let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error });
                }
            }
        }

        JobKind::MoveStorage { new_root } => match storage.move_storage(&new_root) {
            Ok(()) => {
                let _ = completions.send(Completion::MoveStorageDone { token, storage: storage_id });
            }
            Err(error) => {
                let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
            }
        },

        JobKind::RenameFile { file_index, new_path } => match storage.rename_file(file_index, &new_path) {
            Ok(()) => {
                let _ = completions.send(Completion::RenameFileDone { token, storage: storage_id });
            }
            Err(error) => {
                let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
            }
        },

        JobKind::ReleaseFiles => {
            storage.release_files();
            let _ = completions.send(Completion::ReleaseFilesDone { token, storage: storage_id });
        }

        JobKind::DeleteFiles => {
            for key in cache.keys_for_storage(storage_id) {
                cache.discard(key);
            }
            match storage.delete_files() {
                Ok(()) => {
                    let _ = completions.send(Completion::DeleteFilesDone { token, storage: storage_id });
                }
                Err(error) => {
                    let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
                }
            }
        }

        JobKind::CheckFastresume { resume } => match storage.verify_resume(&resume) {
            Ok(matched) => {
                let _ = completions.send(Completion::CheckFastresumeDone { token, storage: storage_id, matched });
            }
            Err(error) => {
                let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error: error.into() });
            }
        },

        JobKind::CheckFiles => {
            let mut good_pieces = Vec::new();
            let mut failure = None;
            for piece in 0..storage.info().num_pieces() as u64 {
                match hash_piece(storage, piece) {
                    Ok(true) => good_pieces.push(piece),
                    Ok(false) => {}
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            match failure {
                Some(error) => {
                    let _ = completions.send(Completion::JobFailed { token, storage: storage_id, error });
                }
                None => {
                    let _ = completions.send(Completion::CheckFilesDone { token, storage: storage_id, good_pieces });
                }
            }
        }

        JobKind::ClearPiece { piece } => {
            cache.discard((storage_id, piece));
            let _ = completions.send(Completion::ClearPieceDone { token, storage: storage_id });
        }

        JobKind::UpdateSettings { settings } => {
            cache.set_limits(settings.cache_size_blocks, settings.cache_expiry);
            let _ = completions.send(Completion::UpdateSettingsDone { token, storage: storage_id });
        }
    }
}

/// Hash a piece's current on-disk bytes and compare against the recorded
/// digest in the metainfo's `pieces` field.
fn hash_piece(storage: &TorrentStorage<NativeFileSystem>, piece: u64) -> Result<bool, crate::error::DiskError> {
    let piece_len = storage.info().piece_size(piece as usize) as usize;
    let mut buffer = vec![0u8; piece_len];
    storage.readv(piece, 0, &mut buffer)?;

    let actual = ShaHash::from_bytes(&buffer);
    let expected = storage.info().pieces.get(piece as usize);
    Ok(expected.map(|e| *e == actual).unwrap_or(false))
}

/// Flush and evict the oldest piece once the cache holds more blocks
/// than its configured capacity (§4.2 "write-back... bounded by a
/// configured block count").
fn evict_over_capacity(cache: &mut BlockCache, storages: &Storages) {
    while let Some(key) = cache.oldest_over_capacity() {
        flush_key(cache, storages, key);
    }
}

/// Flush every piece whose last write is older than `cache_expiry`.
fn sweep_expired(cache: &mut BlockCache, storages: &Storages) {
    for key in cache.expired_keys() {
        flush_key(cache, storages, key);
    }
}

fn flush_key(cache: &mut BlockCache, storages: &Storages, key: (StorageId, u64)) {
    let (storage_id, piece) = key;
    let Some(blocks) = cache.take_blocks(key) else {
        return;
    };
    let Some(storage) = storages.get(&storage_id) else {
        return;
    };

    for (offset, block) in blocks {
        if let Err(error) = storage.writev(piece, offset, &block) {
            // No caller is waiting on this background flush; the storage
            // is now poisoned, so the next job against it surfaces the
            // same failure through the normal completion path.
            warn!("failed to flush piece {} of storage {:?}: {}", piece, storage_id, error);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use swarm_metainfo::{Metainfo, MetainfoBuilder, PieceLength};

    use super::*;
    use crate::job::{JobKind, ManagerRequest, Priority};
    use crate::token::{JobTokenGenerator, StorageIdGenerator};

    fn build_torrent(dir: &tempfile::TempDir, payload_len: usize) -> Metainfo {
        let file_path = dir.path().join("payload.bin");
        std::fs::write(&file_path, vec![5u8; payload_len]).unwrap();

        let builder = MetainfoBuilder::new().set_piece_length(PieceLength::Custom(1024));
        let bytes = builder.build(&file_path, |_| {}).unwrap();
        Metainfo::from_bytes(&bytes).unwrap()
    }

    fn recv_completion(manager: &DiskManager) -> Completion {
        manager
            .completions()
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should respond")
    }

    #[test]
    fn positive_write_then_read_round_trip() {
        let src_dir = tempfile::tempdir().unwrap();
        let metainfo = build_torrent(&src_dir, 1024);

        let store_dir = tempfile::tempdir().unwrap();
        let manager = DiskManager::new(ManagerSettings::default());

        let mut storage_ids = StorageIdGenerator::new();
        let mut tokens = JobTokenGenerator::new();
        let storage = storage_ids.generate();

        manager.submit(ManagerRequest::AddStorage {
            storage,
            metainfo,
            root: store_dir.path().to_path_buf(),
        });
        assert!(matches!(recv_completion(&manager), Completion::StorageAdded { .. }));

        let payload = vec![42u8; 1024];
        manager.submit(ManagerRequest::Job(DiskJob {
            token: tokens.generate(),
            storage,
            priority: Priority::NORMAL,
            kind: JobKind::Write { piece: 0, offset: 0, buffer: payload.clone() },
        }));
        assert!(matches!(recv_completion(&manager), Completion::WriteDone { .. }));

        manager.submit(ManagerRequest::Job(DiskJob {
            token: tokens.generate(),
            storage,
            priority: Priority::NORMAL,
            kind: JobKind::Read { piece: 0, offset: 0, length: 1024 },
        }));
        match recv_completion(&manager) {
            Completion::ReadDone { buffer, .. } => assert_eq!(buffer, payload),
            _ => panic!("expected ReadDone"),
        }
    }

    #[test]
    fn positive_hash_job_matches_recorded_digest() {
        let src_dir = tempfile::tempdir().unwrap();
        let metainfo = build_torrent(&src_dir, 1024);

        let store_dir = tempfile::tempdir().unwrap();
        let manager = DiskManager::new(ManagerSettings::default());

        let mut storage_ids = StorageIdGenerator::new();
        let mut tokens = JobTokenGenerator::new();
        let storage = storage_ids.generate();

        manager.submit(ManagerRequest::AddStorage {
            storage,
            metainfo,
            root: store_dir.path().to_path_buf(),
        });
        recv_completion(&manager);

        manager.submit(ManagerRequest::Job(DiskJob {
            token: tokens.generate(),
            storage,
            priority: Priority::NORMAL,
            kind: JobKind::Write { piece: 0, offset: 0, buffer: vec![5u8; 1024] },
        }));
        recv_completion(&manager);

        manager.submit(ManagerRequest::Job(DiskJob {
            token: tokens.generate(),
            storage,
            priority: Priority::NORMAL,
            kind: JobKind::Hash { piece: 0 },
        }));
        match recv_completion(&manager) {
            Completion::HashDone { matched, .. } => assert!(matched),
            _ => panic!("expected HashDone"),
        }
    }

    #[test]
    fn positive_unknown_storage_fails_job() {
        let manager = DiskManager::new(ManagerSettings::default());
        let mut storage_ids = StorageIdGenerator::new();
        let mut tokens = JobTokenGenerator::new();

        manager.submit(ManagerRequest::Job(DiskJob {
            token: tokens.generate(),
            storage: storage_ids.generate(),
            priority: Priority::NORMAL,
            kind: JobKind::ClearPiece { piece: 0 },
        }));

        assert!(matches!(recv_completion(&manager), Completion::JobFailed { .. }));
    }
}
