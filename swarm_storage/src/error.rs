//! Errors for the storage map.

use std::io;

error_chain! {
    types {
        StorageError, StorageErrorKind, StorageResultEx, StorageResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        OutOfRange {
            requested: u64,
            total: u64
        } {
            description("requested range exceeds total storage size")
            display("requested {} bytes past a storage of {} bytes", requested, total)
        }
        StorageIo {
            file: usize,
            kind: io::ErrorKind
        } {
            description("io error accessing a storage file")
            display("io error on file {}: {:?}", file, kind)
        }
        PathCollision {
            path: String
        } {
            description("rename or move target already exists")
            display("path already exists: {}", path)
        }
        Poisoned {
            reason: String
        } {
            description("storage handle is poisoned after a fatal error")
            display("storage handle poisoned: {}", reason)
        }
    }
}
