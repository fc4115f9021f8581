//! Whole-project conversion: read one format, write the other through the
//! shared document model.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;
use ywx_novx::NovxFile;
use ywx_yw7::Yw7File;

fn checked_extension(path: &Path, expected: &str) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if extension != expected {
        bail!("file must be .{expected} type, but is \".{extension}\"");
    }
    Ok(())
}

/// Converts `source.yw7` to its sibling `source.novx`.
pub fn yw7_to_novx(source: &Path) -> Result<PathBuf> {
    checked_extension(source, ywx_yw7::EXTENSION)?;
    let target_path = source.with_extension(ywx_novx::EXTENSION);

    let mut source_file = Yw7File::new(source);
    source_file
        .read()
        .with_context(|| format!("reading \"{}\"", source.display()))?;

    let mut target_file = NovxFile::new(&target_path);
    target_file.novel = std::mem::take(&mut source_file.novel);
    target_file.wc_log = std::mem::take(&mut source_file.wc_log);
    target_file
        .write()
        .with_context(|| format!("writing \"{}\"", target_path.display()))?;

    info!(target = %target_path.display(), "converted to novx");
    Ok(target_path)
}

/// Exports `source.novx` to its sibling `source.yw7`.
pub fn novx_to_yw7(source: &Path) -> Result<PathBuf> {
    checked_extension(source, ywx_novx::EXTENSION)?;
    let target_path = source.with_extension(ywx_yw7::EXTENSION);

    let mut source_file = NovxFile::new(source);
    source_file
        .read()
        .with_context(|| format!("reading \"{}\"", source.display()))?;

    let mut target_file = Yw7File::new(&target_path);
    target_file.novel = std::mem::take(&mut source_file.novel);
    target_file.wc_log = std::mem::take(&mut source_file.wc_log);
    target_file
        .write()
        .with_context(|| format!("writing \"{}\"", target_path.display()))?;

    info!(target = %target_path.display(), "exported to yw7");
    Ok(target_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_extension_is_a_precondition_error() {
        assert!(yw7_to_novx(Path::new("novel.txt")).is_err());
        assert!(novx_to_yw7(Path::new("novel.yw7")).is_err());
    }
}
