/// Run-scoped scratch directories.
///
/// Every evaluation writes its script and suite files into a fresh
/// uuid-named directory that it owns exclusively. Removal happens through
/// [`ScratchDir::cleanup`] on the normal path and through `Drop` on every
/// other path, panics included. Removal failures are logged and swallowed.
use crate::config::types::{EvalError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCRATCH_PREFIX: &str = "evalbox-";
const SCRATCH_PERMS: u32 = 0o700;

pub struct ScratchDir {
    run_id: String,
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/evalbox-<uuid>` with owner-only permissions.
    pub fn create(root: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let path = root.join(format!("{}{}", SCRATCH_PREFIX, run_id));

        fs::create_dir_all(&path).map_err(|e| {
            EvalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create scratch directory {}: {}", path.display(), e),
            ))
        })?;
        fs::set_permissions(&path, fs::Permissions::from_mode(SCRATCH_PERMS))?;

        log::debug!("created scratch directory {}", path.display());
        Ok(Self {
            run_id,
            path,
            removed: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `contents` at `relative`, creating parent directories.
    pub fn write_file(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let target = self.path.join(relative);
        if !target.starts_with(&self.path) {
            return Err(EvalError::Config(format!(
                "refusing to write outside the scratch directory: {}",
                relative
            )));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents).map_err(|e| {
            EvalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", target.display(), e),
            ))
        })?;
        Ok(target)
    }

    /// Remove the directory tree. Idempotent.
    pub fn cleanup(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("removed scratch directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove scratch directory {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("evalbox_test_{}_{}", name, std::process::id()));
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn scratch_dirs_are_unique_and_private() {
        let root = test_root("unique");
        let a = ScratchDir::create(&root).unwrap();
        let b = ScratchDir::create(&root).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with(SCRATCH_PREFIX));

        let mode = fs::metadata(a.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SCRATCH_PERMS);
        drop(a);
        drop(b);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn write_file_creates_parents() {
        let root = test_root("write");
        let mut scratch = ScratchDir::create(&root).unwrap();
        let written = scratch.write_file("tests/unit/test_add.py", "def test(): pass\n").unwrap();
        assert_eq!(fs::read_to_string(&written).unwrap(), "def test(): pass\n");

        scratch.cleanup();
        assert!(!scratch.path().exists());
        scratch.cleanup();
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn drop_removes_directory() {
        let root = test_root("drop");
        let path = {
            let scratch = ScratchDir::create(&root).unwrap();
            scratch.write_file("harness.py", "print('x')").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn panic_still_removes_directory() {
        let root = test_root("panic");
        let captured = std::sync::Mutex::new(None);
        let result = std::panic::catch_unwind(|| {
            let scratch = ScratchDir::create(&root).unwrap();
            *captured.lock().unwrap() = Some(scratch.path().to_path_buf());
            panic!("evaluation blew up");
        });
        assert!(result.is_err());
        let path = captured.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn absolute_paths_are_refused() {
        let root = test_root("absolute");
        let scratch = ScratchDir::create(&root).unwrap();
        assert!(scratch.write_file("/tmp/escape.py", "").is_err());
        drop(scratch);
        let _ = fs::remove_dir_all(root);
    }
}
