//! Iterators over torrent file information.

use swarm_util::sha::ShaHash;

use crate::info::{File, Info, Key};

/// Iterator over each file described by an `Info` dictionary.
///
/// For a single-file torrent this yields one synthesized `File` built from
/// the info dictionary's own `name`/`length`, so callers never need to
/// special-case the single- vs multi-file layout.
pub struct Files<'a> {
    index: usize,
    single: Option<File>,
    multi: &'a [File],
}

impl<'a> Files<'a> {
    pub fn new(info: &'a Info) -> Files<'a> {
        match &info.key {
            Key::SingleFile { length, md5sum } => Files {
                index: 0,
                single: Some(File {
                    length: *length,
                    path: vec![info.name.clone()],
                    md5sum: md5sum.clone(),
                    attr: None,
                    symlink_path: None,
                    sha1: None,
                    mtime: None,
                }),
                multi: &[],
            },
            Key::MultiFile { files } => Files {
                index: 0,
                single: None,
                multi: files,
            },
        }
    }
}

impl<'a> Iterator for Files<'a> {
    type Item = File;

    fn next(&mut self) -> Option<File> {
        if let Some(file) = &self.single {
            if self.index == 0 {
                self.index += 1;
                return Some(file.clone());
            }
            return None;
        }

        if let Some(file) = self.multi.get(self.index) {
            self.index += 1;
            Some(file.clone())
        } else {
            None
        }
    }
}

// ----------------------------------------------------------------------------//

/// Iterator over each piece hash within a `Metainfo`'s info dictionary.
pub struct Pieces<'a> {
    index: usize,
    hashes: &'a crate::hashes::Hashes,
}

impl<'a> Pieces<'a> {
    pub fn new(hashes: &'a crate::hashes::Hashes) -> Pieces<'a> {
        Pieces { index: 0, hashes }
    }
}

impl<'a> Iterator for Pieces<'a> {
    type Item = &'a ShaHash;

    fn next(&mut self) -> Option<&'a ShaHash> {
        let item = self.hashes.get(self.index);
        if item.is_some() {
            self.index += 1;
        }
        item
    }
}
