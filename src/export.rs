//! Writing pipeline outputs to disk.
//!
//! Every stage buffers its whole output in memory and hands it to
//! [`write_atomic`], which writes a temporary file next to the target and
//! renames it into place. A failed run therefore never leaves a truncated
//! file behind; the previous output (if any) stays untouched.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::models::GraphDocument;

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Serialize a graph document as pretty JSON and write it atomically.
pub fn export_graph(doc: &GraphDocument, output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    write_atomic(output, json.as_bytes())?;
    tracing::debug!(output = %output.display(), bytes = json.len(), "wrote graph document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/out.txt");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }
}
