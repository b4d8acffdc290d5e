use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

/// Sidecars live under their own root; bucket names cannot start with a dot
const META_DIR: &str = ".meta";

/// Sidecar metadata kept for every object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
}

/// Bucketed object store on the local filesystem
#[derive(Clone)]
pub struct ObjectStorage {
    base_path: PathBuf,
    public_url: String,
}

impl ObjectStorage {
    pub fn new(base_path: impl AsRef<Path>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve an object path inside a bucket, refusing anything that could escape it
    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain || !is_valid_segment(bucket) {
            return Err(AppError::BadRequest(format!("Invalid object path: {}", path)));
        }
        Ok(self.base_path.join(bucket).join(relative))
    }

    fn meta_path(&self, bucket: &str, path: &str) -> PathBuf {
        self.base_path
            .join(META_DIR)
            .join(bucket)
            .join(format!("{}.json", path))
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/object/public/{}/{}", self.public_url, bucket, path)
    }

    /// Store an object. Without `upsert` an existing object is left alone and
    /// the call fails with a conflict.
    pub async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        meta: ObjectMeta,
        upsert: bool,
    ) -> Result<(), AppError> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true);
        if upsert {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let mut file = options.open(&target).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                AppError::Conflict(format!("The resource already exists: {}", path))
            }
            _ => e.into(),
        })?;
        file.write_all(data).await?;
        file.flush().await?;

        let meta_json = serde_json::to_vec(&meta).map_err(|e| AppError::Internal(e.to_string()))?;
        let meta_path = self.meta_path(bucket, path);
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(meta_path, meta_json).await?;

        tracing::debug!("Stored object {}/{} ({} bytes)", bucket, path, data.len());
        Ok(())
    }

    pub async fn get(&self, bucket: &str, path: &str) -> Result<(Vec<u8>, Option<ObjectMeta>), AppError> {
        let target = self.object_path(bucket, path)?;
        let data = fs::read(&target).await?;

        let meta = match fs::read(self.meta_path(bucket, path)).await {
            Ok(raw) => match serde_json::from_slice::<ObjectMeta>(&raw) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!("Failed to parse object metadata for {}: {}", path, e);
                    None
                }
            },
            Err(_) => None,
        };

        Ok((data, meta))
    }

    /// Remove objects, skipping ones that are already gone. Returns the paths removed.
    pub async fn remove(&self, bucket: &str, paths: &[String]) -> Result<Vec<String>, AppError> {
        let mut removed = Vec::new();
        for path in paths {
            let target = self.object_path(bucket, path)?;
            match fs::remove_file(&target).await {
                Ok(_) => {
                    let _ = fs::remove_file(self.meta_path(bucket, path)).await;
                    removed.push(path.clone());
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    tracing::warn!("Attempted to remove {}/{} but didn't find anything", bucket, path);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(removed)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
