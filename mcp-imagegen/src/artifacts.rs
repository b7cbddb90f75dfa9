//! Artifact Store: durable, job-addressed persistence of generated images.
//!
//! Layout on disk: `{root}/{job_id}/image-{index}.{ext}`. An artifact is
//! written once and never modified afterwards.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::error::{ErrorKind, ErrorRecord};
use crate::jobs::JobId;

/// Reference to a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Store-relative key, `{job_id}/image-{index}.{ext}`.
    #[serde(rename = "ref")]
    pub key: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Artifact Store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact '{0}' not found")]
    NotFound(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Unavailable { .. } => ErrorKind::StorageUnavailable,
            StorageError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self.to_string())
    }

    fn unavailable(path: &Path, source: std::io::Error) -> Self {
        StorageError::Unavailable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File extension for a media type.
pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Media type of a stored artifact, from its key's extension.
pub fn media_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Filesystem-backed artifact store rooted at a mounted volume.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist one image of a job.
    ///
    /// The bytes are written to a temporary sibling and then renamed into
    /// place, so a reader never sees a partial file and an existing artifact
    /// is never replaced.
    #[instrument(level = "debug", skip(self, bytes), fields(job.id = %job_id, size = bytes.len()))]
    pub async fn persist(
        &self,
        job_id: JobId,
        index: usize,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<ArtifactRef, StorageError> {
        let dir = self.root.join(job_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::unavailable(&dir, e))?;

        let file_name = format!("image-{}.{}", index, extension_for(media_type));
        let final_path = dir.join(&file_name);
        let tmp_path = dir.join(format!(".{}.tmp", file_name));

        if let Err(e) = write_new(&tmp_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::unavailable(&tmp_path, e));
        }

        if let Err(e) = publish(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::unavailable(&final_path, e));
        }

        debug!(path = %final_path.display(), "Artifact persisted");

        Ok(ArtifactRef {
            key: format!("{}/{}", job_id, file_name),
            media_type: media_type.to_string(),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        })
    }

    /// Read back the bytes of a persisted artifact.
    pub async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StorageError> {
        self.fetch_key(&artifact.key).await
    }

    /// Read an artifact by its store-relative key.
    pub async fn fetch_key(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::unavailable(&path, e)),
        }
    }

    /// Remove everything written for a job. Used when persistence fails part way.
    pub async fn discard(&self, job_id: JobId) {
        let dir = self.root.join(job_id.to_string());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(job.id = %job_id, "Discarded partial artifacts"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job.id = %job_id, error = %e, "Failed to discard partial artifacts"),
        }
    }

    /// Map a key to a path inside the root; keys are exactly `{job_id}/{file}`.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let components: Vec<_> = relative.components().collect();
        let well_formed = components.len() == 2
            && components.iter().all(|c| matches!(c, Component::Normal(_)))
            && components[0]
                .as_os_str()
                .to_str()
                .is_some_and(|dir| dir.parse::<JobId>().is_ok());
        if !well_formed {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Move a fully written file to its final name. Refuses to replace an existing file.
async fn publish(tmp_path: &Path, final_path: &Path) -> std::io::Result<()> {
    if fs::try_exists(final_path).await? {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", final_path.display()),
        ));
    }
    fs::rename(tmp_path, final_path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persist_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let job_id = JobId::new();

        let artifact = store.persist(job_id, 0, b"png-bytes", "image/png").await.unwrap();

        assert_eq!(artifact.key, format!("{}/image-0.png", job_id));
        assert_eq!(artifact.size_bytes, 9);
        assert_eq!(artifact.media_type, "image/png");
        assert!(temp_dir.path().join(&artifact.key).is_file());

        let bytes = store.fetch(&artifact).await.unwrap();
        assert_eq!(bytes.len() as u64, artifact.size_bytes);
        assert_eq!(bytes, b"png-bytes");
    }

    #[tokio::test]
    async fn test_no_temporary_files_remain() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let job_id = JobId::new();

        store.persist(job_id, 0, b"a", "image/png").await.unwrap();
        store.persist(job_id, 1, b"b", "image/jpeg").await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(temp_dir.path().join(job_id.to_string()))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["image-0.png", "image-1.jpg"]);
    }

    #[tokio::test]
    async fn test_existing_artifact_is_never_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let job_id = JobId::new();

        let first = store.persist(job_id, 0, b"original", "image/png").await.unwrap();
        let err = store.persist(job_id, 0, b"replacement", "image/png").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert_eq!(store.fetch(&first).await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_publish_moves_temporary_file() {
        let temp_dir = TempDir::new().unwrap();
        let tmp_path = temp_dir.path().join(".image-0.png.tmp");
        let final_path = temp_dir.path().join("image-0.png");
        write_new(&tmp_path, b"bytes").await.unwrap();

        publish(&tmp_path, &final_path).await.unwrap();

        assert!(!tmp_path.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"bytes");
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            assert_eq!(std::fs::metadata(&final_path).unwrap().nlink(), 1);
        }
    }

    #[tokio::test]
    async fn test_publish_refuses_existing_destination() {
        let temp_dir = TempDir::new().unwrap();
        let tmp_path = temp_dir.path().join(".image-0.png.tmp");
        let final_path = temp_dir.path().join("image-0.png");
        std::fs::write(&final_path, b"original").unwrap();
        write_new(&tmp_path, b"replacement").await.unwrap();

        let err = publish(&tmp_path, &final_path).await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&final_path).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_unwritable_root_is_storage_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let not_a_dir = temp_dir.path().join("volume");
        std::fs::write(&not_a_dir, b"occupied").unwrap();
        let store = ArtifactStore::new(&not_a_dir);

        let err = store.persist(JobId::new(), 0, b"x", "image/png").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    }

    #[tokio::test]
    async fn test_fetch_after_external_removal_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let artifact = store.persist(JobId::new(), 0, b"x", "image/png").await.unwrap();

        std::fs::remove_file(temp_dir.path().join(&artifact.key)).unwrap();

        let err = store.fetch(&artifact).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("artifacts"));
        std::fs::write(temp_dir.path().join("secret.txt"), b"secret").unwrap();

        for key in [
            "../secret.txt",
            "/etc/passwd",
            "secret.txt",
            "not-a-job/image-0.png",
            &format!("{}/../../secret.txt", JobId::new()),
        ] {
            let err = store.fetch_key(key).await.unwrap_err();
            assert!(matches!(err, StorageError::NotFound(_)), "key {key} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_discard_removes_job_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let job_id = JobId::new();
        let artifact = store.persist(job_id, 0, b"x", "image/png").await.unwrap();

        store.discard(job_id).await;
        store.discard(job_id).await;

        assert!(!temp_dir.path().join(job_id.to_string()).exists());
        assert!(matches!(store.fetch(&artifact).await, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_extension_for_media_types() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("application/octet-stream"), "bin");
        assert_eq!(media_type_for("job/image-0.jpg"), "image/jpeg");
        assert_eq!(media_type_for("job/image-0.bin"), "application/octet-stream");
    }

    #[test]
    fn test_ref_serializes_with_wire_field_name() {
        let artifact = ArtifactRef {
            key: "job/image-0.png".into(),
            media_type: "image/png".into(),
            size_bytes: 3,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["ref"], "job/image-0.png");
        assert_eq!(value["size_bytes"], 3);
    }
}
