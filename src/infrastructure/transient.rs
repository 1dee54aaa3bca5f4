//! Transient artifact tracking
//!
//! Records the scratch files and directories a run creates inside the output
//! directory, so cleanup removes exactly those and never a generated report.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::traits::FileSystem;

/// Paths created for the duration of one run
#[derive(Debug, Default)]
pub struct TransientArtifacts {
    /// Files created during the run (in creation order)
    files: Vec<PathBuf>,
    /// Directories created during the run (in creation order)
    dirs: Vec<PathBuf>,
}

impl TransientArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_file(&mut self, path: PathBuf) {
        if !self.files.contains(&path) {
            self.files.push(path);
        }
    }

    pub fn track_dir(&mut self, path: PathBuf) {
        if !self.dirs.contains(&path) {
            self.dirs.push(path);
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.files.iter().any(|p| p == path) || self.dirs.iter().any(|p| p == path)
    }

    pub fn tracked_count(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    /// Remove every tracked path that still exists.
    ///
    /// Files go first, then directories, each in reverse creation order.
    /// Failures are counted, not raised; cleanup is best-effort.
    pub fn remove_all(&mut self, fs: &dyn FileSystem) -> CleanupResult {
        let mut result = CleanupResult::default();

        for path in self.files.iter().rev() {
            if fs.exists(path) {
                match fs.remove_file(path) {
                    Ok(()) => result.files_removed += 1,
                    Err(_) => result.failed.push(path.clone()),
                }
            }
        }

        for path in self.dirs.iter().rev() {
            if fs.exists(path) {
                match fs.remove_dir_all(path) {
                    Ok(()) => result.dirs_removed += 1,
                    Err(_) => result.failed.push(path.clone()),
                }
            }
        }

        if result.failed.is_empty() {
            self.files.clear();
            self.dirs.clear();
        }

        result
    }
}

/// Result of a cleanup pass
#[derive(Debug, Default)]
pub struct CleanupResult {
    pub files_removed: usize,
    pub dirs_removed: usize,
    /// Paths that could not be removed
    pub failed: Vec<PathBuf>,
}

impl CleanupResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for CleanupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complete() {
            write!(
                f,
                "removed {} files and {} directories",
                self.files_removed, self.dirs_removed
            )
        } else {
            write!(
                f,
                "removed {} files and {} directories, {} left behind",
                self.files_removed,
                self.dirs_removed,
                self.failed.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MemoryFileSystem;

    #[test]
    fn test_remove_all_only_touches_tracked_paths() {
        let fs = MemoryFileSystem::new();
        let staging = PathBuf::from("/out/.tfexport");
        fs.write(&staging.join("terraform.tfstate"), "{}").unwrap();
        fs.write(Path::new("/out/main.tf"), "resource").unwrap();
        fs.write(Path::new("/out/scratch.tf"), "x").unwrap();

        let mut transient = TransientArtifacts::new();
        transient.track_dir(staging.clone());
        transient.track_file(PathBuf::from("/out/scratch.tf"));

        let result = transient.remove_all(&fs);

        assert!(result.is_complete());
        assert_eq!(result.files_removed, 1);
        assert_eq!(result.dirs_removed, 1);
        assert!(!fs.exists(&staging));
        assert!(fs.exists(Path::new("/out/main.tf")));
        assert_eq!(transient.tracked_count(), 0);
    }

    #[test]
    fn test_tracking_is_idempotent() {
        let mut transient = TransientArtifacts::new();
        transient.track_dir(PathBuf::from("/out/.tfexport"));
        transient.track_dir(PathBuf::from("/out/.tfexport"));

        assert_eq!(transient.tracked_count(), 1);
        assert!(transient.is_tracked(Path::new("/out/.tfexport")));
    }

    #[test]
    fn test_missing_paths_are_ignored() {
        let fs = MemoryFileSystem::new();
        let mut transient = TransientArtifacts::new();
        transient.track_file(PathBuf::from("/gone.tf"));

        let result = transient.remove_all(&fs);
        assert!(result.is_complete());
        assert_eq!(result.to_string(), "removed 0 files and 0 directories");
    }
}
