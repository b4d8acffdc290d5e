use chrono::Utc;
use rand::Rng;
use shared::FileRecord;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};


const ID_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_SUFFIX_LEN: usize = 7;

/// A file on local disk waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl LocalFile {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = guess_mime(&name);

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            mime_type,
        })
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// Where an upload item comes from: a local file, or a row that already exists
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    Local(LocalFile),
    Remote(FileRecord),
}

impl FileSource {
    pub fn name(&self) -> &str {
        match self {
            FileSource::Local(file) => &file.name,
            FileSource::Remote(record) => &record.name,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            FileSource::Local(file) => file.size,
            FileSource::Remote(record) => record.size.max(0) as u64,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            FileSource::Local(file) => &file.mime_type,
            FileSource::Remote(record) => &record.mime_type,
        }
    }

    pub fn is_same_file(&self, other: &FileSource) -> bool {
        self.name() == other.name() && self.size() == other.size()
    }
}

impl From<LocalFile> for FileSource {
    fn from(file: LocalFile) -> Self {
        FileSource::Local(file)
    }
}

impl From<FileRecord> for FileSource {
    fn from(record: FileRecord) -> Self {
        FileSource::Remote(record)
    }
}

/// Handle to a preview created for a local file; valid until revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHandle(u64);

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:dropsync/{}", self.0)
    }
}

/// Tracks live blob previews so they can be released
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next: u64,
    live: HashSet<BlobHandle>,
}

impl PreviewRegistry {
    pub fn create(&mut self) -> BlobHandle {
        self.next += 1;
        let handle = BlobHandle(self.next);
        self.live.insert(handle);
        handle
    }

    pub fn revoke(&mut self, handle: BlobHandle) -> bool {
        self.live.remove(&handle)
    }

    pub fn is_live(&self, handle: BlobHandle) -> bool {
        self.live.contains(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Created for a local file and owned by the queue
    Blob(BlobHandle),
    /// Public URL of an already persisted file; never revoked
    Remote(String),
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preview::Blob(handle) => write!(f, "{}", handle),
            Preview::Remote(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading { progress: u8 },
    Success,
    Error { reason: String },
}

impl UploadStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadStatus::Success)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error { .. })
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Uploading { progress } => write!(f, "uploading ({}%)", progress),
            UploadStatus::Success => write!(f, "success"),
            UploadStatus::Error { reason } => write!(f, "error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub id: String,
    pub source: FileSource,
    pub preview: Preview,
    pub status: UploadStatus,
}

/// `<name>-<unix millis>-<7 random base36 chars>`
pub fn generate_item_id(name: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_CHARSET[rng.gen_range(0..ID_SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("{}-{}-{}", name, Utc::now().timestamp_millis(), suffix)
}

/// MIME type from the file name's extension, octet-stream when unknown
pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("photo.PNG"), "image/png");
        assert_eq!(guess_mime("report.pdf"), "application/pdf");
        assert_eq!(guess_mime("README"), "application/octet-stream");
        assert_eq!(guess_mime("data.unknownext"), "application/octet-stream");
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_item_id("a.png");
        let parts: Vec<&str> = id.rsplitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 7);
        assert!(parts[0].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], "a.png");
    }

    #[test]
    fn test_preview_registry_revokes_once() {
        let mut registry = PreviewRegistry::default();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);

        assert!(registry.revoke(a));
        assert!(!registry.revoke(a));
        assert!(!registry.is_live(a));
        assert!(registry.is_live(b));
    }

    #[tokio::test]
    async fn test_local_file_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let file = LocalFile::open(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 11);
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.read().await.unwrap(), b"hello world");

        assert!(LocalFile::open(dir.path()).await.is_err());
    }
}
