// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Candidate-file port: where rule patterns look for files to serve.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Storage port for the binary files a rule may send.
pub trait FileSource: Send + Sync {
    /// Names of all candidate files (no directory component).
    fn list(&self) -> io::Result<Vec<String>>;
    /// Full contents of the named file.
    fn read(&self, name: &str) -> io::Result<Bytes>;
}

/// Regular files in a single directory (not recursive).
#[derive(Debug, Clone)]
pub struct DirSource {
    base: PathBuf,
}

impl DirSource {
    /// Serve files from `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl FileSource for DirSource {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Non-UTF-8 names cannot be matched by a pattern anyway.
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn read(&self, name: &str) -> io::Result<Bytes> {
        fs::read(self.base.join(name)).map(Bytes::from)
    }
}

/// In-memory listing, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Bytes>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        self.insert(name, contents);
        self
    }

    /// Add (or replace) a file in place.
    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<Bytes>) {
        self.files.insert(name.into(), contents.into());
    }
}

impl FileSource for MemorySource {
    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, name: &str) -> io::Result<Bytes> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}
