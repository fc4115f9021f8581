//! yWriter 7 project file codec.
//!
//! The legacy flat XML schema: typed data is encoded through sentinel child
//! elements (`Unused`, `SectionStart`, `ReactionScene`) and keyword
//! variables (named children of a `Fields` container), text fields are
//! CDATA-wrapped, and an advisory `<path>.lock` file signals that the
//! authoring application has the project open.

mod fields;
mod read;
mod write;

pub use fields::STAGE_MARKER;

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use ywx_markup::MarkupError;
use ywx_model::{ModelError, Novel};

pub const EXTENSION: &str = "yw7";

#[derive(Debug, Error)]
pub enum Yw7Error {
    #[error("yWriter seems to be open. Please close first: \"{0}\"")]
    Locked(String),

    #[error("cannot read file \"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot process file \"{path}\" - {message}")]
    Parse { path: String, message: String },

    #[error("cannot overwrite file \"{path}\"")]
    Backup { path: String },

    #[error("cannot write file \"{path}\"")]
    Write { path: String },

    #[error("XML serialization failed: {0}")]
    Serialize(String),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A yWriter 7 project file bound to a document model.
pub struct Yw7File {
    pub path: PathBuf,
    pub novel: Novel,
    /// Word-count log: ISO date mapped to `(count, total_count)`.
    pub wc_log: IndexMap<String, (String, String)>,
    /// Legacy scene IDs that actually are plot points, discovered while
    /// reading arc-defining chapters and consumed by the scene pass.
    pub(crate) plot_point_scene_ids: Vec<String>,
}

impl Yw7File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            novel: Novel::default(),
            wc_log: IndexMap::new(),
            plot_point_scene_ids: Vec::new(),
        }
    }

    /// An advisory lock file next to the project marks it as open in the
    /// authoring application. A stale lock is indistinguishable from a
    /// live one.
    pub fn is_locked(&self) -> bool {
        sibling_file(&self.path, "lock").is_file()
    }

    pub(crate) fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// `<path>.suffix` without touching the original extension.
pub(crate) fn sibling_file(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

/// Moves any existing file aside to `<path>.bak`, writes the new content,
/// and restores the backup if the write fails. The only durability
/// mechanism either codec has.
pub(crate) fn write_with_backup(path: &Path, content: &str) -> Result<(), Yw7Error> {
    let backup = sibling_file(path, "bak");
    let mut backed_up = false;
    if path.is_file() {
        fs::rename(path, &backup).map_err(|_| Yw7Error::Backup {
            path: path.display().to_string(),
        })?;
        backed_up = true;
    }
    if fs::write(path, content).is_err() {
        if backed_up {
            let _ = fs::rename(&backup, path);
        }
        return Err(Yw7Error::Write {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Reads the project file as UTF-8, falling back to UTF-16 when a byte
/// order mark says so.
pub(crate) fn load_text(path: &Path) -> Result<String, Yw7Error> {
    let bytes = fs::read(path).map_err(|source| Yw7Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parse_error = |message: String| Yw7Error::Parse {
        path: path.display().to_string(),
        message,
    };

    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        let little_endian = bytes[0] == 0xFF;
        if bytes.len() % 2 != 0 {
            return Err(parse_error("truncated UTF-16 input".to_string()));
        }
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| {
                if little_endian {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        return String::from_utf16(&units).map_err(|e| parse_error(e.to_string()));
    }

    String::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_file_appends_suffix() {
        let path = Path::new("/tmp/project.yw7");
        assert_eq!(
            sibling_file(path, "lock"),
            PathBuf::from("/tmp/project.yw7.lock")
        );
    }

    #[test]
    fn utf16_little_endian_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.yw7");
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&path, bytes).unwrap();
        assert_eq!(load_text(&path).unwrap(), "hello");
    }

    #[test]
    fn overwrite_leaves_a_backup_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.yw7");
        fs::write(&path, "original").unwrap();
        write_with_backup(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(sibling_file(&path, "bak")).unwrap(),
            "original"
        );
    }

    #[test]
    fn write_to_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("p.yw7");
        assert!(matches!(
            write_with_backup(&path, "new"),
            Err(Yw7Error::Write { .. })
        ));
    }
}
