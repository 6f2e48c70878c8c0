//! Guards against overwriting the project store by mistake.
//!
//! Exports write a JSON snapshot; a typo in the output path must never
//! clobber the database the snapshot is taken from.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that a snapshot export path is safe to write.
///
/// Checks:
/// - The output file must have a `.json` extension
/// - The output cannot be the store database itself
pub fn validate_export_path(output: &Path, store: &Path) -> Result<()> {
    let is_json = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        bail!(
            "Safety check failed: export file '{}' must end in .json",
            output.display()
        );
    }

    let same = match (output.canonicalize(), store.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => output == store,
    };
    if same {
        bail!(
            "Safety check failed: export '{}' cannot be the project store '{}'",
            output.display(),
            store.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_export() {
        let output = PathBuf::from("/tmp/projects-backup.json");
        let store = PathBuf::from("/data/projects.sqlite3");
        assert!(validate_export_path(&output, &store).is_ok());
    }

    #[test]
    fn test_export_requires_json() {
        let output = PathBuf::from("/tmp/projects-backup.sqlite3");
        let store = PathBuf::from("/data/projects.sqlite3");
        let err = validate_export_path(&output, &store).unwrap_err();
        assert!(err.to_string().contains("must end in .json"));
    }

    #[test]
    fn test_export_cannot_be_store() {
        let path = PathBuf::from("/data/projects.json");
        let err = validate_export_path(&path, &path).unwrap_err();
        assert!(err.to_string().contains("cannot be the project store"));
    }
}
