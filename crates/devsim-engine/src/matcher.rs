// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! File matcher: pattern + directory snapshot → ordered, immutable file list.
//!
//! Ordering is ascending by the last run of digits in the name (so
//! `graph.2.bin` precedes `graph.10.bin`), ties and names without digits
//! falling back to lexical order. Unnumbered names sort after numbered ones.

use crate::error::MatchError;
use crate::source::FileSource;
use bytes::Bytes;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::Arc;

/// A compiled rule pattern.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    /// Compile `pattern`, anchored at the start of the file name.
    pub fn compile(pattern: &str) -> Result<Self, MatchError> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
            MatchError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether `name` is selected by this pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Matching names from `listing`, in rotation order.
    pub fn select<I>(&self, listing: I) -> Result<Vec<String>, MatchError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = listing.into_iter().filter(|n| self.is_match(n)).collect();
        if names.is_empty() {
            return Err(MatchError::NoMatch {
                pattern: self.source.clone(),
            });
        }
        names.sort_by(|a, b| rotation_order(a, b));
        names.dedup();
        Ok(names)
    }
}

/// Last run of ASCII digits in `name`, if any and if it fits a `u64`.
pub fn numeric_suffix(name: &str) -> Option<u64> {
    let bytes = name.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    name[start..end].parse().ok()
}

fn rotation_order(a: &str, b: &str) -> Ordering {
    match (numeric_suffix(a), numeric_suffix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// One file a rule may send, with its contents loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    /// File name (no directory component).
    pub name: Arc<str>,
    /// Complete file contents; one transmission unit on the wire.
    pub contents: Bytes,
}

/// A rule's rotation set, fixed for the rest of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFiles {
    files: Arc<[MatchedFile]>,
}

impl ResolvedFiles {
    /// Build from already-loaded files. Returns `None` for an empty list.
    pub fn new(files: Vec<MatchedFile>) -> Option<Self> {
        if files.is_empty() {
            return None;
        }
        Some(Self {
            files: files.into(),
        })
    }

    /// Number of files in the rotation (always at least one).
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Always false; an empty rotation never resolves.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// File at `cursor`, wrapping modulo the rotation length.
    pub fn at(&self, cursor: usize) -> &MatchedFile {
        &self.files[cursor % self.files.len()]
    }

    /// Names in rotation order.
    pub fn names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.to_string()).collect()
    }
}

/// Resolve `pattern` against `source`: list, select, order, then load contents.
pub fn resolve(pattern: &str, source: &dyn FileSource) -> Result<ResolvedFiles, MatchError> {
    let compiled = FilePattern::compile(pattern)?;
    let listing = source.list().map_err(MatchError::Listing)?;
    let names = compiled.select(listing)?;

    let mut files = Vec::with_capacity(names.len());
    for name in names {
        let contents = source.read(&name).map_err(|source| MatchError::Read {
            file: name.clone(),
            source,
        })?;
        files.push(MatchedFile {
            name: name.into(),
            contents,
        });
    }
    ResolvedFiles::new(files).ok_or_else(|| MatchError::NoMatch {
        pattern: pattern.to_string(),
    })
}
