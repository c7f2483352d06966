use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)_(\d{4})\.pdf$").unwrap());
static YEAR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").unwrap());

/// Fiscal year encoded in a report file name.
///
/// A `_YYYY.pdf` suffix wins; otherwise the first standalone run of four
/// digits is used.
pub fn year_from_filename(name: &str) -> Option<i32> {
    YEAR_SUFFIX
        .captures(name)
        .or_else(|| YEAR_RUN.captures(name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Year-indexed report paths for one company, iterated most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStore {
    documents: BTreeMap<i32, PathBuf>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `paths` by the year in their file name. Paths without a year
    /// are skipped; a later path for the same year replaces an earlier one.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut store = Self::new();
        for path in paths {
            let path = path.as_ref();
            let year = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(year_from_filename);
            match year {
                Some(year) => store.insert(year, path.to_path_buf()),
                None => debug!("No year in file name {}; skipping", path.display()),
            }
        }
        store
    }

    /// Indexes the regular files directly inside `dir`, visited in file name
    /// order.
    pub fn scan_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let store = Self::from_paths(paths);
        info!(
            "Found {} dated reports in {}",
            store.len(),
            dir.display()
        );
        Ok(store)
    }

    pub fn insert(&mut self, year: i32, path: PathBuf) {
        if let Some(previous) = self.documents.insert(year, path) {
            debug!("Replacing report for {}: {}", year, previous.display());
        }
    }

    pub fn get(&self, year: i32) -> Option<&Path> {
        self.documents.get(&year).map(PathBuf::as_path)
    }

    /// Years in processing order (descending).
    pub fn years(&self) -> Vec<i32> {
        self.documents.keys().rev().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &Path)> {
        self.documents
            .iter()
            .rev()
            .map(|(year, path)| (*year, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
