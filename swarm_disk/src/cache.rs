//! The write-back block cache (§4.2 Write/Read behavior).

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::token::StorageId;

/// Cache key: one entry per piece of one storage.
pub type CacheKey = (StorageId, u64);

/// A cached piece: a sparse set of block buffers plus the bookkeeping
/// needed for LRU eviction and periodic expiry (§3 "Block cache entry").
struct CacheEntry {
    blocks: BTreeMap<u64, Vec<u8>>,
    cached_bytes: u64,
    last_write: Instant,
}

impl CacheEntry {
    fn new() -> CacheEntry {
        CacheEntry {
            blocks: BTreeMap::new(),
            cached_bytes: 0,
            last_write: Instant::now(),
        }
    }

    /// Insert a block at `offset`, freeing any prior buffer at the same
    /// offset first (§4.2: "If that piece already holds a buffer at the
    /// same block offset, the old buffer is freed first").
    fn insert(&mut self, offset: u64, buffer: Vec<u8>) {
        if let Some(old) = self.blocks.remove(&offset) {
            self.cached_bytes -= old.len() as u64;
        }
        self.cached_bytes += buffer.len() as u64;
        self.blocks.insert(offset, buffer);
        self.last_write = Instant::now();
    }

    /// Concatenate blocks in offset order. Only correct once `is_complete`
    /// holds for the piece's declared length.
    fn into_contiguous(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.cached_bytes as usize);
        for (_, buf) in self.blocks {
            out.extend_from_slice(&buf);
        }
        out
    }

    /// The entry's blocks as individual `(offset, buffer)` pairs, safe to
    /// flush one at a time even when the piece isn't complete (a gappy
    /// `into_contiguous` would misplace bytes at the wrong file offset).
    fn into_blocks(self) -> Vec<(u64, Vec<u8>)> {
        self.blocks.into_iter().collect()
    }

    /// True once the cached bytes exactly cover `[0, piece_len)` with no
    /// gaps or overlaps; relies on the disk manager only ever writing
    /// block-aligned, non-overlapping regions.
    fn is_complete(&self, piece_len: u64) -> bool {
        if self.cached_bytes != piece_len {
            return false;
        }
        let mut expected_offset = 0u64;
        for (&offset, buf) in &self.blocks {
            if offset != expected_offset {
                return false;
            }
            expected_offset += buf.len() as u64;
        }
        true
    }

    /// Read `[offset, offset+len)` if every byte in that range is cached.
    fn read_if_covered(&self, offset: u64, len: usize) -> Option<Vec<u8>> {
        let want_end = offset + len as u64;
        let mut out = vec![0u8; len];

        for (&block_offset, buf) in &self.blocks {
            let block_end = block_offset + buf.len() as u64;
            let overlap_start = offset.max(block_offset);
            let overlap_end = want_end.min(block_end);
            if overlap_start < overlap_end {
                let dst_start = (overlap_start - offset) as usize;
                let src_start = (overlap_start - block_offset) as usize;
                let n = (overlap_end - overlap_start) as usize;
                out[dst_start..dst_start + n].copy_from_slice(&buf[src_start..src_start + n]);
            }
        }

        // Verify full coverage by re-checking every requested byte landed
        // in some block's range; cheap enough given piece-sized buffers.
        let mut covered = vec![false; len];
        for (&block_offset, buf) in &self.blocks {
            let block_end = block_offset + buf.len() as u64;
            let overlap_start = offset.max(block_offset);
            let overlap_end = want_end.min(block_end);
            if overlap_start < overlap_end {
                let dst_start = (overlap_start - offset) as usize;
                let n = (overlap_end - overlap_start) as usize;
                for c in &mut covered[dst_start..dst_start + n] {
                    *c = true;
                }
            }
        }

        if covered.into_iter().all(|c| c) {
            Some(out)
        } else {
            None
        }
    }
}

/// A bounded write-back cache shared across every storage the manager
/// owns, keyed by `(storage, piece)`.
pub struct BlockCache {
    entries: HashMap<CacheKey, CacheEntry>,
    cache_size: usize,
    cache_expiry: Duration,
}

impl BlockCache {
    pub fn new(cache_size: usize, cache_expiry: Duration) -> BlockCache {
        BlockCache {
            entries: HashMap::new(),
            cache_size,
            cache_expiry,
        }
    }

    fn total_cached_blocks(&self) -> usize {
        self.entries.values().map(|e| e.blocks.len()).sum()
    }

    /// Insert a freshly-written block. Returns `Some(buffer)` with the
    /// flushed, contiguous piece bytes if inserting this block completed
    /// the piece (the caller is expected to `writev` it and evict the
    /// entry via [`BlockCache::take`]).
    pub fn insert_block(&mut self, key: CacheKey, offset: u64, buffer: Vec<u8>, piece_len: u64) -> bool {
        let entry = self.entries.entry(key).or_insert_with(CacheEntry::new);
        entry.insert(offset, buffer);
        entry.is_complete(piece_len)
    }

    /// Remove and return a piece's cached bytes as one contiguous buffer.
    /// Only valid to call once the piece is known complete; a gappy
    /// entry would otherwise misplace bytes at the wrong file offset.
    pub fn take(&mut self, key: CacheKey) -> Option<Vec<u8>> {
        self.entries.remove(&key).map(CacheEntry::into_contiguous)
    }

    /// Remove and return a piece's cached bytes as individual blocks,
    /// safe to flush even when the piece isn't complete (eviction and
    /// expiry both go through this).
    pub fn take_blocks(&mut self, key: CacheKey) -> Option<Vec<(u64, Vec<u8>)>> {
        self.entries.remove(&key).map(CacheEntry::into_blocks)
    }

    /// Discard a piece's cached blocks without flushing (`clear_piece`).
    pub fn discard(&mut self, key: CacheKey) {
        self.entries.remove(&key);
    }

    /// Read `[offset, offset+len)` from the cache if it's wholly covered.
    pub fn read(&self, key: CacheKey, offset: u64, len: usize) -> Option<Vec<u8>> {
        self.entries.get(&key).and_then(|e| e.read_if_covered(offset, len))
    }

    /// If the cache now holds more blocks than `cache_size`, return the
    /// key of the piece with the oldest `last_write` so the caller can
    /// flush and evict it.
    pub fn oldest_over_capacity(&self) -> Option<CacheKey> {
        if self.total_cached_blocks() <= self.cache_size {
            return None;
        }
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_write)
            .map(|(k, _)| *k)
    }

    /// Keys of every piece whose `last_write` is older than `cache_expiry`,
    /// for the periodic sweep.
    pub fn expired_keys(&self) -> Vec<CacheKey> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_write) > self.cache_expiry)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Remove every entry belonging to `storage` (used on torrent removal).
    pub fn discard_storage(&mut self, storage: StorageId) {
        self.entries.retain(|(s, _), _| *s != storage);
    }

    /// Apply new `cache_size`/`cache_expiry` limits (`update_settings`).
    pub fn set_limits(&mut self, cache_size: usize, cache_expiry: Duration) {
        self.cache_size = cache_size;
        self.cache_expiry = cache_expiry;
    }

    pub fn keys_for_storage(&self, storage: StorageId) -> Vec<CacheKey> {
        self.entries.keys().filter(|(s, _)| *s == storage).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u64, piece: u64) -> CacheKey {
        (crate::token::StorageId(id), piece)
    }

    #[test]
    fn positive_completes_on_last_block() {
        let mut cache = BlockCache::new(100, Duration::from_secs(60));
        let k = key(1, 0);

        assert!(!cache.insert_block(k, 0, vec![0u8; 4], 8));
        assert!(cache.insert_block(k, 4, vec![1u8; 4], 8));

        let flushed = cache.take(k).unwrap();
        assert_eq!(flushed, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn positive_old_block_freed_on_overwrite() {
        let mut cache = BlockCache::new(100, Duration::from_secs(60));
        let k = key(1, 0);

        cache.insert_block(k, 0, vec![9u8; 4], 8);
        cache.insert_block(k, 0, vec![1u8; 4], 8);

        let read = cache.read(k, 0, 4).unwrap();
        assert_eq!(read, vec![1, 1, 1, 1]);
    }

    #[test]
    fn positive_read_not_covered_returns_none() {
        let mut cache = BlockCache::new(100, Duration::from_secs(60));
        let k = key(1, 0);
        cache.insert_block(k, 0, vec![0u8; 4], 8);

        assert!(cache.read(k, 0, 8).is_none());
    }
}
