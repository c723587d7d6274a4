// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maps note names to sample files inside an instrument's asset directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMap {
    directory: PathBuf,
    files: BTreeMap<String, String>,
}

impl SampleMap {
    pub fn new<I, N, F>(directory: impl Into<PathBuf>, files: I) -> SampleMap
    where
        I: IntoIterator<Item = (N, F)>,
        N: Into<String>,
        F: Into<String>,
    {
        SampleMap {
            directory: directory.into(),
            files: files
                .into_iter()
                .map(|(note, file)| (note.into(), file.into()))
                .collect(),
        }
    }

    /// The directory holding this instrument's samples, relative to the asset root.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The file name mapped to a note.
    pub fn file_name(&self, note: &str) -> Option<&str> {
        self.files.get(note).map(String::as_str)
    }

    /// Resolves a note to the path of its sample. Unmapped and empty note names resolve
    /// to nothing.
    pub fn resolve(&self, note: &str) -> Option<PathBuf> {
        self.file_name(note).map(|file| self.directory.join(file))
    }

    /// Mapped note names, sorted.
    #[cfg(test)]
    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
