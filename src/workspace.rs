//! The caller-owned scratch directory a pipeline run works in.
//!
//! Every artifact of a run (downloaded source, intermediate PDF, page
//! images) is written flat into one directory. The pipeline never deletes
//! anything there; the caller decides when the directory goes away, usually
//! by holding a [`tempfile::TempDir`] for as long as the pages are needed.

use crate::error::DocPagesError;
use std::path::{Path, PathBuf};

/// Handle to the directory a single pipeline run reads and writes.
///
/// One workspace must serve one source document: artifacts are named after
/// the source, and a second document in the same directory could be picked
/// up by the fallback renderer's directory scan.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Use an existing directory as the workspace.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DocPagesError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(DocPagesError::NotFound { path: dir });
        }
        Ok(Self { dir })
    }

    /// Use the directory of a [`tempfile::TempDir`] as the workspace.
    pub fn from_temp_dir(temp: &tempfile::TempDir) -> Self {
        Self {
            dir: temp.path().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of a file directly inside the workspace.
    pub fn join(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(file_name)
    }

    /// A fresh, collision-free file name with the given extension.
    pub fn unique_file(&self, extension: &str) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        if extension.is_empty() {
            self.dir.join(id.to_string())
        } else {
            self.dir.join(format!("{id}.{extension}"))
        }
    }
}
