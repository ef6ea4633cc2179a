//! File catalog loading and active source selection
//!
//! The catalog is built once at startup from a single directory listing and
//! never changes afterwards. Exactly one entry is picked as the active source.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::normalized_extension;
use crate::error::{FeedError, FeedResult};

/// How the active source is picked from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum SourceSelection {
    /// Index into the host directory listing order.
    ///
    /// Listing order differs between filesystems, so the chosen file can
    /// change when the data directory moves.
    ListingIndex { index: usize },

    /// Index into the catalog sorted by file name
    SortedIndex { index: usize },

    /// A specific file name that must be present in the catalog
    Named { name: String },
}

impl Default for SourceSelection {
    fn default() -> Self {
        SourceSelection::SortedIndex { index: 1 }
    }
}

/// The file chosen to serve every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSource {
    pub name: String,
    pub path: PathBuf,
}

/// Ordered set of eligible source files in one directory
#[derive(Debug, Clone)]
pub struct Catalog {
    directory: PathBuf,
    entries: Vec<String>,
}

impl Catalog {
    /// Scan `directory` for regular files whose extension matches `extension`
    ///
    /// Entries keep the host listing order.
    pub fn load(directory: impl AsRef<Path>, extension: &str) -> FeedResult<Self> {
        let directory = directory.as_ref();
        let wanted = normalized_extension(extension);
        debug!(directory = %directory.display(), %wanted, "Catalog::load: called");

        let access_err = |source| FeedError::DirectoryAccess {
            path: directory.to_path_buf(),
            source,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(directory).map_err(access_err)? {
            let entry = entry.map_err(access_err)?;

            // Symlinks are followed so a linked recording still counts
            let is_file = fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                warn!(name = ?file_name, "Skipping non-UTF-8 file name");
                continue;
            };

            let matches = Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.to_ascii_lowercase() == wanted);
            if matches {
                entries.push(name.to_string());
            }
        }

        info!(
            directory = %directory.display(),
            count = entries.len(),
            "Catalog loaded"
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            entries,
        })
    }

    /// File names in discovery order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Full path of a catalog entry
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Pick the active source
    ///
    /// Returns `Ok(None)` for an empty catalog; requests are then answered
    /// with "not found" instead of aborting startup. A non-empty catalog
    /// that cannot satisfy the policy is an error.
    pub fn select(&self, selection: &SourceSelection) -> FeedResult<Option<ActiveSource>> {
        debug!(?selection, count = self.entries.len(), "Catalog::select: called");
        if self.entries.is_empty() {
            warn!(directory = %self.directory.display(), "Catalog is empty, no active source");
            return Ok(None);
        }

        let name = match selection {
            SourceSelection::ListingIndex { index } => self.entries.get(*index).cloned().ok_or(
                FeedError::SelectionOutOfRange {
                    index: *index,
                    available: self.entries.len(),
                },
            )?,
            SourceSelection::SortedIndex { index } => {
                let mut sorted: Vec<&String> = self.entries.iter().collect();
                sorted.sort();
                sorted
                    .get(*index)
                    .map(|s| s.to_string())
                    .ok_or(FeedError::SelectionOutOfRange {
                        index: *index,
                        available: self.entries.len(),
                    })?
            }
            SourceSelection::Named { name } => {
                if !self.entries.iter().any(|e| e == name) {
                    return Err(FeedError::SourceNotInCatalog { name: name.clone() });
                }
                name.clone()
            }
        };

        let path = self.path_of(&name);
        info!(%name, path = %path.display(), "Active source selected");
        Ok(Some(ActiveSource { name, path }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(names: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for name in names {
            std::fs::write(temp.path().join(name), "1\n2\n3\n").unwrap();
        }
        temp
    }

    #[test]
    fn test_load_filters_by_extension_case_insensitively() {
        let temp = fixture(&["a.csv", "b.CSV", "notes.txt", "c.Csv", "csv"]);
        std::fs::create_dir(temp.path().join("nested.csv")).unwrap();

        let catalog = Catalog::load(temp.path(), "csv").unwrap();
        let mut names = catalog.entries().to_vec();
        names.sort();

        assert_eq!(names, vec!["a.csv", "b.CSV", "c.Csv"]);
    }

    #[test]
    fn test_load_accepts_dotted_extension() {
        let temp = fixture(&["a.csv", "b.tsv"]);
        let catalog = Catalog::load(temp.path(), ".CSV").unwrap();
        assert_eq!(catalog.entries(), ["a.csv"]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let temp = fixture(&["one.csv", "two.csv", "three.csv", "four.csv"]);

        let first = Catalog::load(temp.path(), "csv").unwrap();
        let second = Catalog::load(temp.path(), "csv").unwrap();

        assert_eq!(first.entries(), second.entries());
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let err = Catalog::load(temp.path().join("absent"), "csv").unwrap_err();
        assert!(matches!(err, FeedError::DirectoryAccess { .. }));
    }

    #[test]
    fn test_empty_catalog_selects_nothing() {
        let temp = fixture(&["readme.md"]);
        let catalog = Catalog::load(temp.path(), "csv").unwrap();

        assert!(catalog.is_empty());
        assert_eq!(catalog.select(&SourceSelection::default()).unwrap(), None);
    }

    #[test]
    fn test_sorted_index_selects_second_file() {
        let temp = fixture(&["c.csv", "a.csv", "b.csv"]);
        let catalog = Catalog::load(temp.path(), "csv").unwrap();

        let active = catalog.select(&SourceSelection::SortedIndex { index: 1 }).unwrap().unwrap();
        assert_eq!(active.name, "b.csv");
        assert_eq!(active.path, temp.path().join("b.csv"));
    }

    #[test]
    fn test_listing_index_follows_catalog_order() {
        let temp = fixture(&["x.csv", "y.csv"]);
        let catalog = Catalog::load(temp.path(), "csv").unwrap();

        let active = catalog.select(&SourceSelection::ListingIndex { index: 1 }).unwrap().unwrap();
        assert_eq!(active.name, catalog.entries()[1]);
    }

    #[test]
    fn test_index_out_of_range_fails() {
        let temp = fixture(&["only.csv"]);
        let catalog = Catalog::load(temp.path(), "csv").unwrap();

        let err = catalog.select(&SourceSelection::SortedIndex { index: 1 }).unwrap_err();
        assert!(matches!(
            err,
            FeedError::SelectionOutOfRange { index: 1, available: 1 }
        ));
    }

    #[test]
    fn test_named_selection() {
        let temp = fixture(&["a.csv", "b.csv"]);
        let catalog = Catalog::load(temp.path(), "csv").unwrap();

        let active = catalog
            .select(&SourceSelection::Named { name: "a.csv".to_string() })
            .unwrap()
            .unwrap();
        assert_eq!(active.name, "a.csv");

        let err = catalog
            .select(&SourceSelection::Named { name: "z.csv".to_string() })
            .unwrap_err();
        assert!(matches!(err, FeedError::SourceNotInCatalog { .. }));
    }

    #[test]
    fn test_selection_yaml_shape() {
        let selection: SourceSelection = serde_yaml::from_str("policy: listing-index\nindex: 3\n").unwrap();
        assert_eq!(selection, SourceSelection::ListingIndex { index: 3 });
    }
}
