//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Archive I/O (component E): the package is a tar archive containing
//! exactly one top-level directory, named `model_<32-hex>`, holding the
//! signed manifest, the root model payload, and every attribute payload.
//!
//! `tar::Archive<R>`'s entry iterator consumes its underlying reader as it
//! goes, so it can only be walked once for a plain (non-seekable) `R` —
//! asking for `meta.version`, then `meta.json.asc`, then every attribute in
//! turn, each via its own `entries()` call, fails on the second call
//! onward. [`ArchiveIndex::read`] walks the archive exactly once and
//! buffers every member, so every lookup after that is a map access.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};

use crate::error::ArchiveError;
use crate::stream::VerifiedStream;

/// The fully-buffered contents of a loaded archive: the single top-level
/// directory name, plus every regular-file member's bytes, indexed by its
/// full path (`<directory>/<name>`).
pub struct ArchiveIndex {
    directory: String,
    files: HashMap<String, Vec<u8>>,
}

impl ArchiveIndex {
    /// Read `reader` as a tar archive in a single pass, enforcing "exactly
    /// one top-level directory" (I1) along the way.
    pub fn read<R: Read>(reader: R) -> Result<Self, ArchiveError> {
        let mut archive = tar::Archive::new(reader);
        let mut directories = BTreeSet::new();
        let mut files = HashMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_path_buf();
            let path_str = path.to_string_lossy().into_owned();

            if let Some(first) = path.components().next() {
                directories.insert(first.as_os_str().to_string_lossy().into_owned());
            }

            match entry.header().entry_type() {
                tar::EntryType::Directory => continue,
                tar::EntryType::Regular => {
                    let mut bytes = Vec::new();
                    entry.read_to_end(&mut bytes)?;
                    files.insert(path_str, bytes);
                }
                _ => return Err(ArchiveError::NotAFile(path_str)),
            }
        }

        let mut iter = directories.into_iter();
        let first = iter.next().ok_or(ArchiveError::NoDirectory)?;
        let rest: Vec<String> = iter.collect();
        if !rest.is_empty() {
            let mut all = vec![first];
            all.extend(rest);
            return Err(ArchiveError::MultipleDirectories(all));
        }

        Ok(Self {
            directory: first,
            files,
        })
    }

    /// The archive's single top-level directory name.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// A previously-buffered member's bytes, erroring if it is missing.
    pub fn member_bytes(&self, member_path: &str) -> Result<Vec<u8>, ArchiveError> {
        self.files
            .get(member_path)
            .cloned()
            .ok_or_else(|| ArchiveError::MissingMember(member_path.to_string()))
    }
}

/// Generate a fresh model directory name of the form `model_<32-hex>`.
fn new_model_directory_name() -> String {
    format!("model_{}", uuid::Uuid::new_v4().simple())
}

/// Invent a fresh top-level directory name, add its directory entry to
/// `builder`, and return the name — callers write every other member under
/// `<name>/...` afterwards. Call this exactly once per archive: every
/// member written for one save must share this one directory (I1).
pub fn create_model_directory<W: Write>(builder: &mut tar::Builder<W>) -> Result<String, ArchiveError> {
    let name = new_model_directory_name();

    let mut header = tar::Header::new_gnu();
    header.set_size(0);
    header.set_mode(0o755);
    header.set_entry_type(tar::EntryType::Directory);
    header.set_cksum();
    builder.append_data(&mut header, format!("{name}/"), std::io::empty())?;

    Ok(name)
}

/// Append a finalized, fully-buffered [`VerifiedStream`] to `builder` as
/// `member_path`.
pub fn write_member<W: Write>(
    builder: &mut tar::Builder<W>,
    member_path: &str,
    mut stream: VerifiedStream,
) -> Result<(), ArchiveError> {
    use std::io::Seek;

    let size = stream.seek(std::io::SeekFrom::End(0))?;
    stream.seek(std::io::SeekFrom::Start(0))?;

    let mut header = tar::Header::new_gnu();
    header.set_size(size);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    builder.append_data(&mut header, member_path, stream)?;
    Ok(())
}

/// Append raw bytes (used for the signed manifest, which is never wrapped
/// in a [`VerifiedStream`] of its own — its integrity comes from the
/// signature itself).
pub fn write_member_bytes<W: Write>(
    builder: &mut tar::Builder<W>,
    member_path: &str,
    bytes: &[u8],
) -> Result<(), ArchiveError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append_data(&mut header, member_path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_archive(directory: Option<&str>, members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut buf);
            if let Some(dir) = directory {
                let mut header = tar::Header::new_gnu();
                header.set_size(0);
                header.set_mode(0o755);
                header.set_entry_type(tar::EntryType::Directory);
                header.set_cksum();
                builder
                    .append_data(&mut header, format!("{dir}/"), std::io::empty())
                    .unwrap();
            }
            for (path, bytes) in members {
                write_member_bytes(&mut builder, path, bytes).unwrap();
            }
            builder.finish().unwrap();
        }
        buf
    }

    #[test]
    fn finds_the_single_top_level_directory() {
        let buf = build_archive(
            Some("model_abc"),
            &[("model_abc/meta.json.asc", b"x"), ("model_abc/THEMODEL.pickle", b"y")],
        );
        let index = ArchiveIndex::read(Cursor::new(buf)).unwrap();
        assert_eq!(index.directory(), "model_abc");
    }

    #[test]
    fn finds_the_directory_even_without_an_explicit_directory_entry() {
        // Members whose path merely starts with a shared prefix component
        // still agree on one top-level directory, even if no directory
        // entry was ever written for it (tolerates older archives).
        let buf = build_archive(None, &[("model_abc/meta.json.asc", b"x"), ("model_abc/THEMODEL.pickle", b"y")]);
        let index = ArchiveIndex::read(Cursor::new(buf)).unwrap();
        assert_eq!(index.directory(), "model_abc");
    }

    #[test]
    fn rejects_multiple_top_level_directories() {
        let buf = build_archive(None, &[("model_abc/meta.json.asc", b"x"), ("model_def/meta.json.asc", b"y")]);
        let err = ArchiveIndex::read(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ArchiveError::MultipleDirectories(_)));
    }

    #[test]
    fn rejects_empty_archive() {
        let buf = build_archive(None, &[]);
        let err = ArchiveIndex::read(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ArchiveError::NoDirectory));
    }

    #[test]
    fn reads_every_member_in_a_single_pass() {
        let buf = build_archive(
            Some("model_abc"),
            &[
                ("model_abc/meta.version", b"3\n"),
                ("model_abc/meta.json.asc", b"hello"),
                ("model_abc/THEMODEL.pickle", b"root"),
            ],
        );
        let index = ArchiveIndex::read(Cursor::new(buf)).unwrap();
        assert_eq!(index.member_bytes("model_abc/meta.version").unwrap(), b"3\n");
        assert_eq!(index.member_bytes("model_abc/meta.json.asc").unwrap(), b"hello");
        assert_eq!(index.member_bytes("model_abc/THEMODEL.pickle").unwrap(), b"root");
    }

    #[test]
    fn missing_member_errors() {
        let buf = build_archive(Some("model_abc"), &[("model_abc/meta.json.asc", b"hello")]);
        let index = ArchiveIndex::read(Cursor::new(buf)).unwrap();
        let err = index.member_bytes("model_abc/nope").unwrap_err();
        assert!(matches!(err, ArchiveError::MissingMember(_)));
    }

    #[test]
    fn directory_names_are_unique() {
        assert_ne!(new_model_directory_name(), new_model_directory_name());
    }

    #[test]
    fn create_model_directory_adds_a_directory_entry() {
        let mut buf = Vec::new();
        let name = {
            let mut builder = tar::Builder::new(&mut buf);
            let name = create_model_directory(&mut builder).unwrap();
            write_member_bytes(&mut builder, &format!("{name}/meta.version"), b"3\n").unwrap();
            builder.finish().unwrap();
            name
        };

        let mut archive = tar::Archive::new(Cursor::new(buf));
        let entries: Vec<_> = archive.entries().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        let dir_entry = entries
            .iter()
            .find(|e| e.header().entry_type() == tar::EntryType::Directory)
            .expect("a directory entry must be present");
        assert_eq!(dir_entry.path().unwrap().to_string_lossy(), format!("{name}/"));
    }
}
