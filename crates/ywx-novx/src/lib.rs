//! novx project file codec.
//!
//! The newer structured XML schema: typed attributes instead of sentinel
//! elements, nested `<p>` paragraphs for rich text, space-separated ID-list
//! attributes for associations, and an explicit `version="major.minor"`
//! compatibility gate on the root element.

mod read;
mod write;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use thiserror::Error;
use ywx_model::{ModelError, Novel};

pub const EXTENSION: &str = "novx";
pub const MAJOR_VERSION: u32 = 1;
pub const MINOR_VERSION: u32 = 4;

#[derive(Debug, Error)]
pub enum NovxError {
    #[error("no valid xml root element found in file: \"{0}\"")]
    BadRoot(String),

    #[error("no valid version found in file: \"{0}\"")]
    BadVersion(String),

    #[error("the project \"{0}\" was created with a newer application version")]
    CreatedWithNewer(String),

    #[error("the project \"{0}\" was created with an outdated application version")]
    CreatedWithOlder(String),

    #[error("corrupt project data ({0})")]
    Corrupt(String),

    #[error("cannot process file \"{path}\" - {message}")]
    Parse { path: String, message: String },

    #[error("cannot read file \"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot overwrite file \"{path}\"")]
    Backup { path: String },

    #[error("cannot write file \"{path}\"")]
    Write { path: String },

    #[error("XML serialization failed: {0}")]
    Serialize(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A novx project file bound to a document model.
pub struct NovxFile {
    pub path: PathBuf,
    pub novel: Novel,
    /// Word-count log: ISO date mapped to `(count, count_with_unused)`.
    pub wc_log: IndexMap<String, (String, String)>,
    /// Pending log entries, applied on the next write when the project
    /// tracks word counts.
    pub(crate) wc_log_update: IndexMap<String, (String, String)>,
    pub(crate) timestamp: Option<SystemTime>,
}

impl NovxFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            novel: Novel::default(),
            wc_log: IndexMap::new(),
            wc_log_update: IndexMap::new(),
            timestamp: None,
        }
    }

    pub(crate) fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    pub(crate) fn get_timestamp(&mut self) {
        self.timestamp = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok();
    }
}

/// `<path>.suffix` without touching the original extension.
pub(crate) fn sibling_file(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

/// Same backup/restore discipline as the legacy codec: rename the old file
/// to `.bak`, write, rename back on failure.
pub fn write_with_backup(path: &Path, content: &str) -> Result<(), NovxError> {
    let backup = sibling_file(path, "bak");
    let mut backed_up = false;
    if path.is_file() {
        fs::rename(path, &backup).map_err(|_| NovxError::Backup {
            path: path.display().to_string(),
        })?;
        backed_up = true;
    }
    if fs::write(path, content).is_err() {
        if backed_up {
            let _ = fs::rename(&backup, path);
        }
        return Err(NovxError::Write {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
