//! Index snapshot persistence – `~/.reverie/index.json`.
//!
//! The index lives in memory while the CLI runs; it is loaded at start-up and
//! written back on exit so memories and their lifecycle survive restarts.
//! A file that fails to load is moved aside with [`quarantine`] before the
//! exit-time save can overwrite it.

use reverie_types::Memory;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::write_private;

/// Load a snapshot.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Vec<Memory>>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read snapshot at {}: {}", path.display(), e))?;
    let memories = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse snapshot: {}", e))?;
    Ok(Some(memories))
}

/// Write a snapshot with owner-only permissions.
pub fn save_to(memories: &[Memory], path: &Path) -> Result<(), String> {
    let raw = serde_json::to_vec_pretty(memories)
        .map_err(|e| format!("Failed to serialize snapshot: {}", e))?;
    write_private(path, &raw)
}

/// Rename an unreadable snapshot to `<name>.corrupt`, replacing any earlier
/// quarantined copy.  Returns the new path.
pub fn quarantine(path: &Path) -> Result<PathBuf, String> {
    let mut name = path
        .file_name()
        .ok_or_else(|| format!("Snapshot path {} has no file name", path.display()))?
        .to_os_string();
    name.push(".corrupt");
    let target = path.with_file_name(name);
    fs::rename(path, &target).map_err(|e| {
        format!(
            "Failed to move {} to {}: {}",
            path.display(),
            target.display(),
            e
        )
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_types::{DatumId, Lifecycle};

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(load_from(&dir.path().join("index.json")).unwrap().is_none());
    }

    #[test]
    fn snapshot_survives_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join(".reverie").join("index.json");
        let memories = vec![
            Memory::create(DatumId::from("a"), vec![0.6, 0.8]).with_lifecycle(Lifecycle::Dormant),
            Memory::create(DatumId::from("b"), vec![1.0, 0.0]).with_relevance(0.25),
        ];
        save_to(&memories, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), Some(memories));
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("index.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[test]
    fn quarantine_moves_corrupt_snapshot_aside() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(load_from(&path).is_err());

        let moved = quarantine(&path).unwrap();
        assert_eq!(moved, dir.path().join("index.json.corrupt"));
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "{ truncated");
        assert!(load_from(&path).unwrap().is_none());

        // The exit-time save now lands next to the quarantined file.
        save_to(&[], &path).unwrap();
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "{ truncated");
    }

    #[test]
    fn quarantine_of_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(quarantine(&dir.path().join("index.json")).is_err());
    }
}
