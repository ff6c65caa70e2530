use crate::services::error::{ConvertError, ConvertResult};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest extension kept from a client supplied filename.
const MAX_EXTENSION_LEN: usize = 16;

/// Where a staged file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrigin {
    Upload,
    Intermediate,
    Output,
}

/// A request-scoped temporary file.
///
/// This is a cheap handle; the file itself belongs to the [`RequestScope`] that
/// created it and is removed when that scope is released.
#[derive(Debug, Clone)]
pub struct StagedFile {
    id: Uuid,
    path: PathBuf,
    extension: Option<String>,
    origin: FileOrigin,
}

impl StagedFile {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn origin(&self) -> FileOrigin {
        self.origin
    }
}

/// The shared temporary directory. A flat namespace, never a coordination point.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory if needed.
    pub async fn prepare(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let area = Self::new(root);
        tokio::fs::create_dir_all(&area.root).await?;
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens a fresh registry for one request.
    pub fn scope(&self) -> RequestScope {
        RequestScope {
            root: self.root.clone(),
            files: Vec::new(),
        }
    }
}

/// Registry of every file staged while serving a single request.
///
/// Dropping the scope deletes all registered files. Handlers move the scope into
/// the response body so deletion happens once the last byte has been sent.
#[derive(Debug)]
pub struct RequestScope {
    root: PathBuf,
    files: Vec<StagedFile>,
}

impl RequestScope {
    /// Copies an inbound stream to `<uuid>.<ext>` under the staging root.
    pub async fn stage_upload<R>(&mut self, claimed_name: &str, mut reader: R) -> ConvertResult<StagedFile>
    where
        R: AsyncRead + Unpin,
    {
        let extension = safe_extension(claimed_name);
        let id = Uuid::new_v4();
        let path = self.root.join(file_name(id, None, extension.as_deref()));

        let written = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        match written {
            Ok(bytes) => {
                debug!("Staged upload {} ({} bytes) at {}", claimed_name, bytes, path.display());
                let staged = StagedFile {
                    id,
                    path,
                    extension,
                    origin: FileOrigin::Upload,
                };
                self.files.push(staged.clone());
                Ok(staged)
            }
            Err(e) => {
                remove_quietly(&path);
                Err(ConvertError::Io(e))
            }
        }
    }

    /// Reserves a path for a generated file and registers it for cleanup.
    ///
    /// Nothing is created on disk; the path is registered first so that a partially
    /// written output is still removed.
    pub fn allocate(&mut self, origin: FileOrigin, label: &str, extension: &str) -> StagedFile {
        let id = Uuid::new_v4();
        let extension = Some(extension.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty());
        let path = self
            .root
            .join(file_name(id, Some(label), extension.as_deref()));
        let staged = StagedFile {
            id,
            path,
            extension,
            origin,
        };
        self.files.push(staged.clone());
        staged
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Deletes every registered file. Safe to call more than once.
    pub fn release(&mut self) -> usize {
        let mut removed = 0;
        for staged in self.files.drain(..) {
            if remove_quietly(&staged.path) {
                removed += 1;
            }
        }
        removed
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if !self.files.is_empty() {
            let removed = self.release();
            debug!("Request scope released ({} files removed)", removed);
        }
    }
}

fn file_name(id: Uuid, label: Option<&str>, extension: Option<&str>) -> String {
    let mut name = id.simple().to_string();
    if let Some(label) = label {
        name.push('_');
        name.push_str(label);
    }
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Extension of the claimed filename, reduced to lowercase ASCII alphanumerics.
pub fn safe_extension(claimed_name: &str) -> Option<String> {
    let base = claimed_name.rsplit(['/', '\\']).next().unwrap_or("");
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() { None } else { Some(ext) }
}

/// Missing files are fine: never written, or already gone.
fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove staged file {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_safe_extension() {
        assert_eq!(safe_extension("report.PDF"), Some("pdf".to_string()));
        assert_eq!(safe_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(safe_extension("../../etc/passwd"), None);
        assert_eq!(safe_extension("..\\evil.e/x/e"), None);
        assert_eq!(safe_extension("noext"), None);
        assert_eq!(safe_extension(".bashrc"), None);
        assert_eq!(safe_extension("weird.p$d%f"), Some("pdf".to_string()));
    }

    #[tokio::test]
    async fn test_stage_upload_uses_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        let mut scope = area.scope();

        let staged = scope
            .stage_upload("../secret report.pdf", &b"%PDF-1.4 test"[..])
            .await
            .unwrap();

        assert_eq!(staged.origin(), FileOrigin::Upload);
        assert_eq!(staged.extension(), Some("pdf"));
        assert_eq!(staged.path().parent().unwrap(), dir.path());
        let name = staged.path().file_name().unwrap().to_str().unwrap();
        assert_eq!(name, format!("{}.pdf", staged.id().simple()));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_nothing_registered() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path().join("missing-subdir"));
        let mut scope = area.scope();

        let result = scope.stage_upload("a.pdf", &b"data"[..]).await;
        assert!(matches!(result, Err(ConvertError::Io(_))));
        assert!(scope.files().is_empty());
    }

    #[tokio::test]
    async fn test_drop_removes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        {
            let mut scope = area.scope();
            scope.stage_upload("in.pdf", &b"one"[..]).await.unwrap();
            let overlay = scope.allocate(FileOrigin::Intermediate, "overlay", "pdf");
            std::fs::write(overlay.path(), b"two").unwrap();
            let output = scope.allocate(FileOrigin::Output, "merged", ".PDF");
            std::fs::write(output.path(), b"three").unwrap();
            assert!(output.path().to_str().unwrap().ends_with("_merged.pdf"));
            assert_eq!(entries(dir.path()), 3);
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        let mut scope = area.scope();

        let written = scope.allocate(FileOrigin::Output, "out", "pdf");
        std::fs::write(written.path(), b"x").unwrap();
        // Reserved but never written, e.g. conversion failed first.
        scope.allocate(FileOrigin::Intermediate, "never", "pdf");

        assert_eq!(scope.release(), 1);
        assert_eq!(scope.release(), 0);
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_allocated_names_are_unique() {
        let area = StagingArea::new("/tmp/unused");
        let mut scope = area.scope();
        let a = scope.allocate(FileOrigin::Output, "split", "pdf");
        let b = scope.allocate(FileOrigin::Output, "split", "pdf");
        assert_ne!(a.path(), b.path());
        scope.files.clear();
    }
}
