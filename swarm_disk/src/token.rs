//! Identifiers for registered storages and in-flight jobs.

use swarm_util::trans::{SequentialIds, TransactionIds};

/// Identifies one `TorrentStorage` registered with a `DiskManager`.
/// Used as the `storage` half of the `(storage, piece)` elevator key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(pub(crate) u64);

pub struct StorageIdGenerator {
    generator: SequentialIds<u64>,
}

impl StorageIdGenerator {
    pub fn new() -> StorageIdGenerator {
        StorageIdGenerator {
            generator: SequentialIds::new(),
        }
    }

    pub fn generate(&mut self) -> StorageId {
        StorageId(self.generator.generate())
    }
}

impl Default for StorageIdGenerator {
    fn default() -> StorageIdGenerator {
        StorageIdGenerator::new()
    }
}

/// Identifies one submitted job, returned to the caller at submission time
/// so completions can be correlated back to requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobToken(u64);

pub struct JobTokenGenerator {
    generator: SequentialIds<u64>,
}

impl JobTokenGenerator {
    pub fn new() -> JobTokenGenerator {
        JobTokenGenerator {
            generator: SequentialIds::new(),
        }
    }

    pub fn generate(&mut self) -> JobToken {
        JobToken(self.generator.generate())
    }
}

impl Default for JobTokenGenerator {
    fn default() -> JobTokenGenerator {
        JobTokenGenerator::new()
    }
}
