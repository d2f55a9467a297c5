//! Staged uploads and rollback of installed files.

use crate::error::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// A received file waiting in the staging directory.
///
/// The file is removed when the handle is dropped, whether or not it was
/// moved into the uploads tree.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    extension: Option<String>,
}

impl StagedFile {
    /// Create an empty file in `staging_dir` under a generated name and open
    /// it for writing.
    pub async fn create(
        staging_dir: &Path,
        part: &str,
        original_name: Option<&str>,
    ) -> Result<(Self, tokio::fs::File)> {
        tokio::fs::create_dir_all(staging_dir).await?;

        let extension = original_name.and_then(safe_extension);
        let path = staging_dir.join(staged_file_name(part, extension.as_deref()));
        let file = tokio::fs::File::create(&path).await?;

        Ok((Self { path, extension }, file))
    }

    /// Write `data` into `staging_dir` under a generated name.
    #[cfg(test)]
    pub(crate) async fn write(
        staging_dir: &Path,
        part: &str,
        original_name: Option<&str>,
        data: &[u8],
    ) -> Result<Self> {
        use tokio::io::AsyncWriteExt;

        let (staged, mut file) = Self::create(staging_dir, part, original_name).await?;
        file.write_all(data).await?;
        file.flush().await?;

        tracing::debug!(path = %staged.path.display(), bytes = data.len(), "Staged upload");
        Ok(staged)
    }

    /// Location of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `base` with this file's extension appended.
    pub fn file_name(&self, base: &str) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", base, ext),
            None => base.to_string(),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

/// `{part}-{unix_millis}-{random}{.ext}`.
pub fn staged_file_name(part: &str, extension: Option<&str>) -> String {
    let suffix = uuid::Uuid::new_v4().simple();
    let millis = Utc::now().timestamp_millis();
    match extension {
        Some(ext) => format!("{}-{}-{}.{}", part, millis, suffix, ext),
        None => format!("{}-{}-{}", part, millis, suffix),
    }
}

/// Lowercased extension of a client-supplied name, if it is short and alphanumeric.
fn safe_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Files and directories moved into the uploads tree by one operation.
///
/// Everything recorded is removed on drop unless [`InstalledPaths::commit`]
/// was called.
#[derive(Debug, Default)]
pub struct InstalledPaths {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl InstalledPaths {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `dir` (and parents); recorded only if it did not exist.
    pub fn create_dir(&mut self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "Upload directory already exists, reusing it");
            return Ok(());
        }

        std::fs::create_dir_all(dir)?;
        self.paths.push(dir.to_path_buf());
        Ok(())
    }

    /// Move `from` to `to`, copying when a rename is not possible.
    pub fn install_file(&mut self, from: &Path, to: &Path) -> Result<()> {
        if std::fs::rename(from, to).is_err() {
            std::fs::copy(from, to)?;
            remove_quietly(from);
        }

        self.paths.push(to.to_path_buf());
        Ok(())
    }

    /// Keep everything installed so far.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for InstalledPaths {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        for path in self.paths.iter().rev() {
            remove_quietly(path);
        }

        if !self.paths.is_empty() {
            tracing::info!(paths = self.paths.len(), "Rolled back installed upload files");
        }
    }
}

/// Remove a file or directory tree, ignoring paths that are already gone.
pub fn remove_quietly(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_file_name() {
        let a = staged_file_name("capa", Some("jpg"));
        let b = staged_file_name("capa", Some("jpg"));

        assert!(a.starts_with("capa-"));
        assert!(a.ends_with(".jpg"));
        assert_ne!(a, b);
        assert!(!staged_file_name("capitulo_zip", None).contains('.'));
    }

    #[test]
    fn test_safe_extension() {
        assert_eq!(safe_extension("Cover.JPG"), Some("jpg".to_string()));
        assert_eq!(safe_extension("chapter.zip"), Some("zip".to_string()));
        assert_eq!(safe_extension("noext"), None);
        assert_eq!(safe_extension("evil.p/h"), None);
        assert_eq!(safe_extension("x.a b"), None);
    }

    #[tokio::test]
    async fn test_staged_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFile::write(dir.path(), "capa", Some("a.png"), b"data")
            .await
            .unwrap();
        let path = staged.path().to_path_buf();

        assert!(path.exists());
        assert_eq!(staged.file_name("capa"), "capa.png");
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_installed_paths_rolled_back_unless_committed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"x").unwrap();
        let target_dir = dir.path().join("work");
        let target = target_dir.join("capa.txt");

        {
            let mut installed = InstalledPaths::new();
            installed.create_dir(&target_dir).unwrap();
            installed.install_file(&src, &target).unwrap();
            assert!(target.exists());
        }
        assert!(!target_dir.exists());

        std::fs::write(&src, b"x").unwrap();
        let mut installed = InstalledPaths::new();
        installed.create_dir(&target_dir).unwrap();
        installed.install_file(&src, &target).unwrap();
        installed.commit();
        assert!(target.exists());
    }
}
