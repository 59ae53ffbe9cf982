//! Errors surfaced on disk job completions (§7's `io_error`/`hash_mismatch`/
//! `cancelled`/`resource_exhausted` taxonomy, as it applies to this crate).

use std::io;

use swarm_storage::error::StorageError;

error_chain! {
    types {
        DiskError, DiskErrorKind, DiskResultExt, DiskResult;
    }

    foreign_links {
        Io(io::Error);
        Storage(StorageError);
    }

    errors {
        StorageNotFound {
            storage: u64
        } {
            description("no storage registered under this id")
            display("no storage registered under id {}", storage)
        }
        StorageErrorRepeat {
            storage: u64
        } {
            description("storage handle is poisoned from a prior fatal error")
            display("storage {} is poisoned; job rejected without retrying I/O", storage)
        }
        HashMismatch {
            piece: u64
        } {
            description("piece failed hash verification")
            display("piece {} failed hash verification", piece)
        }
        Cancelled {
            reason: String
        } {
            description("job was cancelled before completion")
            display("job cancelled: {}", reason)
        }
        ResourceExhausted {
            resource: String
        } {
            description("a bounded resource was exhausted")
            display("resource exhausted: {}", resource)
        }
    }
}
