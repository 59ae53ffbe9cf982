//! Errors for torrent file building and parsing.

use std::io;

use walkdir;

error_chain! {
    types {
        ParseError, ParseErrorKind, ParseResultEx, ParseResult;
    }

    foreign_links {
        Io(io::Error);
        Dir(walkdir::Error);
        Bencode(serde_bencode::Error);
    }

    errors {
        InvalidData {
            details: String
        } {
            description("invalid torrent metadata")
            display("invalid torrent metadata: {}", details)
        }

        MissingData {
            details: String
        } {
            description("missing data detected in file")
            display("missing data detected in file: {}", details)
        }
    }
}
