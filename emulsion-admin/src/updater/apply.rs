//! File-tree diffing and staged, rollback-capable apply
//!
//! The plan compares the unpacked release against the install dir:
//! changed or new files are copied, files absent from the release and
//! not preserved are removed. The copy itself is staged (`.new`), then
//! swapped (`.old`), so a mid-apply failure puts every already-swapped
//! file back.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{archive::sha256_file, is_preserved, UpdateError};

/// Changes an update will make, as install-dir-relative paths.
#[derive(Debug, Clone, Default)]
pub struct ApplyPlan {
    /// Files to copy from the unpacked release (new or changed)
    pub copy: Vec<PathBuf>,
    /// Files present locally but absent from the release
    pub remove: Vec<PathBuf>,
}

/// Diff the unpacked release tree against the install dir.
///
/// Unchanged files (equal SHA-256) are skipped; preserved paths are
/// invisible to both sides of the diff.
pub fn plan_changes(
    install_dir: &Path,
    unpack_dir: &Path,
    preserved: &[&str],
) -> Result<ApplyPlan, UpdateError> {
    let mut plan = ApplyPlan::default();

    for entry in WalkDir::new(unpack_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(unpack_dir)
            .map_err(|_| UpdateError::Invalid("walk escaped unpack dir".to_string()))?
            .to_path_buf();
        if is_preserved(&rel, preserved) {
            continue;
        }

        let dest = install_dir.join(&rel);
        let changed = if dest.is_file() {
            sha256_file(entry.path())? != sha256_file(&dest)?
        } else {
            true
        };
        if changed {
            plan.copy.push(rel);
        }
    }

    if install_dir.is_dir() {
        for entry in WalkDir::new(install_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(install_dir)
                .map_err(|_| UpdateError::Invalid("walk escaped install dir".to_string()))?
                .to_path_buf();
            if is_preserved(&rel, preserved) {
                continue;
            }
            if !unpack_dir.join(&rel).is_file() {
                plan.remove.push(rel);
            }
        }
    }

    plan.copy.sort();
    plan.remove.sort();
    Ok(plan)
}

/// Staged file replacement with rollback.
///
/// `stage_file` copies sources to `dest.new`; `commit` swaps each target
/// to `dest.old` and renames the staged copy into place. A failure
/// during commit renames every already-swapped `.old` back.
pub struct UpdateTransaction {
    staged: Vec<(PathBuf, PathBuf)>, // (new_path, dest)
}

impl UpdateTransaction {
    pub fn new() -> Self {
        Self { staged: Vec::new() }
    }

    pub fn stage_file(&mut self, src: &Path, dest: &Path) -> Result<(), UpdateError> {
        let new_path = with_suffix(dest, "new");
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if new_path.exists() {
            let _ = fs::remove_file(&new_path);
        }
        fs::copy(src, &new_path)?;
        self.staged.push((new_path, dest.to_path_buf()));
        Ok(())
    }

    pub fn commit(self) -> Result<(), UpdateError> {
        let mut swapped: Vec<(PathBuf, PathBuf)> = Vec::new(); // (old_path, dest)

        for (new_path, dest) in &self.staged {
            let old_path = with_suffix(dest, "old");
            if old_path.exists() {
                let _ = fs::remove_file(&old_path);
            }

            let result = (|| -> Result<(), UpdateError> {
                if dest.exists() {
                    fs::rename(dest, &old_path)?;
                    swapped.push((old_path.clone(), dest.clone()));
                }
                fs::rename(new_path, dest)?;
                Ok(())
            })();

            if let Err(e) = result {
                // Put every already-swapped file back
                for (old_path, dest) in swapped.iter().rev() {
                    let _ = fs::remove_file(dest);
                    let _ = fs::rename(old_path, dest);
                }
                // Drop remaining staged copies
                for (new_path, _) in &self.staged {
                    let _ = fs::remove_file(new_path);
                }
                return Err(e);
            }
        }

        // Success: clear the .old copies
        for (old_path, _) in &swapped {
            let _ = fs::remove_file(old_path);
        }
        Ok(())
    }
}

impl Default for UpdateTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove files the release no longer ships. Failures are collected,
/// not fatal.
pub fn remove_stale(install_dir: &Path, remove: &[PathBuf]) -> Vec<String> {
    let mut failures = Vec::new();
    for rel in remove {
        let path = install_dir.join(rel);
        if !path.exists() {
            continue;
        }
        if let Err(e) = fs::remove_file(&path) {
            failures.push(format!("{}: {e}", path.display()));
            continue;
        }
        prune_empty_parents(install_dir, &path);
    }
    failures
}

fn prune_empty_parents(install_dir: &Path, path: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == install_dir {
            break;
        }
        match fs::read_dir(dir).map(|mut entries| entries.next().is_none()) {
            Ok(true) => {
                if fs::remove_dir(dir).is_err() {
                    break;
                }
            }
            _ => break,
        }
        current = dir.parent();
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    name.push('.');
    name.push_str(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::PRESERVED_PATHS;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn plan_detects_new_changed_and_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let install = tmp.path().join("install");
        let unpack = tmp.path().join("unpack");

        write(&install.join("unchanged.txt"), "same");
        write(&install.join("changed.txt"), "old");
        write(&install.join("stale.txt"), "gone soon");
        write(&install.join("media/keep.jpg"), "photo");

        write(&unpack.join("unchanged.txt"), "same");
        write(&unpack.join("changed.txt"), "new");
        write(&unpack.join("added.txt"), "fresh");

        let plan = plan_changes(&install, &unpack, PRESERVED_PATHS).unwrap();

        assert_eq!(
            plan.copy,
            vec![PathBuf::from("added.txt"), PathBuf::from("changed.txt")]
        );
        assert_eq!(plan.remove, vec![PathBuf::from("stale.txt")]);
    }

    #[test]
    fn plan_never_touches_preserved_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let install = tmp.path().join("install");
        let unpack = tmp.path().join("unpack");

        write(&install.join("media/a.jpg"), "data");
        write(&install.join("emulsion.db"), "db");
        write(&unpack.join("media/a.jpg"), "different");

        let plan = plan_changes(&install, &unpack, PRESERVED_PATHS).unwrap();
        assert!(plan.copy.is_empty());
        assert!(plan.remove.is_empty());
    }

    #[test]
    fn transaction_commits_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dest = tmp.path().join("install/app.txt");
        write(&src, "v2");
        write(&dest, "v1");

        let mut transaction = UpdateTransaction::new();
        transaction.stage_file(&src, &dest).unwrap();
        transaction.commit().unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "v2");
        assert!(!with_suffix(&dest, "old").exists());
        assert!(!with_suffix(&dest, "new").exists());
    }

    #[test]
    fn failed_stage_leaves_dest_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("install/app.txt");
        write(&dest, "v1");

        let mut transaction = UpdateTransaction::new();
        let err = transaction.stage_file(&tmp.path().join("missing.txt"), &dest);
        assert!(err.is_err());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "v1");
    }

    #[test]
    fn remove_stale_prunes_empty_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let install = tmp.path().join("install");
        write(&install.join("old/nested/file.txt"), "x");
        write(&install.join("keep.txt"), "y");

        let failures = remove_stale(&install, &[PathBuf::from("old/nested/file.txt")]);
        assert!(failures.is_empty());
        assert!(!install.join("old").exists());
        assert!(install.join("keep.txt").exists());
    }

    #[test]
    fn remove_stale_missing_file_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let failures = remove_stale(tmp.path(), &[PathBuf::from("never-existed.txt")]);
        assert!(failures.is_empty());
    }
}
