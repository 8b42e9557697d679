//! Document loading: resolve a file or directory into [`SourceDocument`]s.
//!
//! PDFs are extracted page by page with `pdf-extract`, one [`Segment`] per
//! page. Plain-text files (`.txt`, `.md`) load as a single segment. Which
//! files a directory scan picks up is controlled by
//! [`LoaderConfig::include_globs`], matched against file names.
//!
//! Directory scans are non-recursive and sorted by file name so that the
//! resulting document order is reproducible.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::error::{RagError, Result};
use crate::models::{Segment, SourceDocument};

pub struct DocumentLoader {
    include: GlobSet,
}

impl DocumentLoader {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        Ok(Self {
            include: build_globset(&config.include_globs)?,
        })
    }

    /// Load a single file, or every recognized file in a directory.
    ///
    /// A missing path fails with [`RagError::NotFound`], unless it is written
    /// with a trailing separator (`docs/`), which names a directory and fails
    /// with [`RagError::NotADirectory`].
    pub fn load(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        if path.is_dir() || names_directory(path) {
            self.load_directory(path)
        } else if path.is_file() {
            Ok(vec![self.load_file(path)?])
        } else if !path.exists() {
            Err(RagError::NotFound {
                path: path.to_path_buf(),
            })
        } else {
            Err(RagError::NotADirectory {
                path: path.to_path_buf(),
            })
        }
    }

    /// Load one document. The file need not match `include_globs`.
    pub fn load_file(&self, path: &Path) -> Result<SourceDocument> {
        if !path.is_file() {
            return Err(RagError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let source_path = path.display().to_string();
        let pages = match extension(path).as_str() {
            "pdf" => extract_pdf_pages(path)?,
            "txt" | "md" => vec![std::fs::read_to_string(path).map_err(|e| unreadable(path, e))?],
            other => {
                return Err(unreadable(
                    path,
                    format!("unsupported file type '.{}'", other),
                ))
            }
        };

        let segments = pages
            .into_iter()
            .enumerate()
            .map(|(page_index, text)| Segment {
                text,
                page_index,
                source_path: source_path.clone(),
            })
            .collect::<Vec<_>>();

        debug!(path = %source_path, pages = segments.len(), "loaded document");
        Ok(SourceDocument {
            path: path.to_path_buf(),
            segments,
        })
    }

    /// Load every file directly inside `dir` whose name matches `include_globs`.
    ///
    /// An empty directory (or one with no matching files) is not an error.
    pub fn load_directory(&self, dir: &Path) -> Result<Vec<SourceDocument>> {
        if !dir.is_dir() {
            return Err(RagError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        let mut documents = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| unreadable(dir, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.include.is_match(name.as_ref()) {
                continue;
            }
            documents.push(self.load_file(entry.path())?);
        }

        Ok(documents)
    }
}

/// Extract per-page text from a PDF.
///
/// `pdf-extract` can panic on malformed input; a panic is reported as an
/// unreadable document instead of tearing down the caller.
fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|e| unreadable(path, e))?;
    let extracted = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }));
    match extracted {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(unreadable(path, e)),
        Err(_) => Err(unreadable(path, "PDF parser panicked")),
    }
}

fn names_directory(path: &Path) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .ends_with(std::path::is_separator)
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn unreadable(path: &Path, detail: impl ToString) -> RagError {
    RagError::UnreadableDocument {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            RagError::InvalidConfig(format!("invalid include glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::InvalidConfig(format!("invalid include globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn loader(globs: &[&str]) -> DocumentLoader {
        DocumentLoader::new(&LoaderConfig {
            include_globs: globs.iter().map(|g| g.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = loader(&["*.pdf"]).load(Path::new("non_existent.pdf")).unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }

    #[test]
    fn test_missing_directory_is_not_a_directory() {
        let err = loader(&["*.pdf"])
            .load_directory(Path::new("non_existent_folder"))
            .unwrap_err();
        assert!(matches!(err, RagError::NotADirectory { .. }));

        let err = loader(&["*.pdf"])
            .load(Path::new("non_existent_folder/"))
            .unwrap_err();
        assert!(matches!(err, RagError::NotADirectory { .. }));
    }

    #[test]
    fn test_empty_directory_yields_no_documents() {
        let tmp = TempDir::new().unwrap();
        let docs = loader(&["*.pdf"]).load(tmp.path()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_directory_scan_filters_sorts_and_skips_subdirs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "bravo").unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        fs::write(tmp.path().join("notes.csv"), "x,y").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("c.txt"), "charlie").unwrap();

        let docs = loader(&["*.txt"]).load(tmp.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].segments[0].text, "alpha");
        assert_eq!(docs[1].segments[0].text, "bravo");
        assert_eq!(docs[0].segments[0].page_index, 0);
    }

    #[test]
    fn test_corrupt_pdf_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        fs::write(&path, b"not a pdf").unwrap();
        let err = loader(&["*.pdf"]).load(&path).unwrap_err();
        assert!(matches!(err, RagError::UnreadableDocument { .. }));
    }

    #[test]
    fn test_unsupported_extension_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sheet.csv");
        fs::write(&path, "a,b").unwrap();
        let err = loader(&["*"]).load(&path).unwrap_err();
        assert!(matches!(err, RagError::UnreadableDocument { .. }));
    }

    #[test]
    fn test_bad_glob_is_invalid_config() {
        let err = DocumentLoader::new(&LoaderConfig {
            include_globs: vec!["[".to_string()],
        })
        .err()
        .unwrap();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }
}
