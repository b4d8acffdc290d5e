use shared::User;

use super::item::{FileSource, UploadStatus};
use super::queue::UploadQueue;
use crate::actions::{upload_file, UploadPayload};
use crate::backend::Backend;
use crate::error::ClientError;

pub const UPLOAD_FAILED: &str = "Failed to upload file";

/// Where uploaded files are delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A receive session; its id doubles as the receiver id
    Session(String),
    /// A user's personal inbox
    Receiver(String),
}

impl Destination {
    pub fn receiver_id(&self) -> &str {
        match self {
            Destination::Session(id) | Destination::Receiver(id) => id,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Destination::Session(id) => Some(id),
            Destination::Receiver(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl UploadReport {
    pub fn into_result(self) -> Result<Self, ClientError> {
        if self.failed > 0 {
            return Err(ClientError::PartialBatchFailure {
                succeeded: self.succeeded,
                failed: self.failed,
            });
        }
        Ok(self)
    }
}

/// Send every queued item that has not been uploaded yet, one at a time.
///
/// A failing item is marked as errored and the run moves on; afterwards no
/// item is left pending or uploading.
pub async fn upload_all(
    queue: &mut UploadQueue,
    backend: &dyn Backend,
    destination: &Destination,
    user: Option<&User>,
) -> Result<UploadReport, ClientError> {
    let user = user.ok_or(ClientError::AuthRequired)?;
    let mut report = UploadReport::default();

    for id in queue.unsent_ids() {
        let Some(item) = queue.get(&id) else {
            continue;
        };
        let source = item.source.clone();

        queue.set_status(&id, UploadStatus::Uploading { progress: 0 });

        let result = match &source {
            FileSource::Local(file) => {
                let payload = UploadPayload {
                    receiver_id: destination.receiver_id(),
                    session_id: destination.session_id(),
                    user_id: &user.id,
                    file,
                };
                upload_file(backend, payload).await.map(|_| ())
            }
            // Already stored; nothing to send
            FileSource::Remote(_) => Ok(()),
        };

        match result {
            Ok(()) => {
                tracing::info!("Uploaded {}", source.name());
                queue.set_status(&id, UploadStatus::Success);
                report.succeeded += 1;
            }
            Err(e) => {
                tracing::error!("Error uploading file {}: {}", source.name(), e);
                queue.set_status(
                    &id,
                    UploadStatus::Error {
                        reason: UPLOAD_FAILED.to_string(),
                    },
                );
                queue.push_error(UPLOAD_FAILED);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::upload::item::LocalFile;
    use crate::upload::validation::UploadOptions;
    use tempfile::TempDir;

    async fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> FileSource {
        let path = dir.path().join(name);
        tokio::fs::write(&path, contents).await.unwrap();
        FileSource::Local(LocalFile::open(&path).await.unwrap())
    }

    fn multi() -> UploadOptions {
        UploadOptions {
            multiple: true,
            ..Default::default()
        }
    }

    async fn signed_in_user(backend: &MemoryBackend) -> User {
        backend.get_current_user().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_nothing_left_pending() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::signed_in("sender");
        backend.fail_upload_of("b.txt");
        let user = signed_in_user(&backend).await;

        let mut queue = UploadQueue::new(multi());
        queue.add(vec![
            write_file(&dir, "a.txt", b"aaa").await,
            write_file(&dir, "b.txt", b"bbb").await,
            write_file(&dir, "c.txt", b"ccc").await,
        ]);

        let destination = Destination::Session("ABCD1234".to_string());
        let report = upload_all(&mut queue, &backend, &destination, Some(&user))
            .await
            .unwrap();

        assert_eq!(report, UploadReport { succeeded: 2, failed: 1 });
        assert!(queue
            .items()
            .iter()
            .all(|i| !matches!(i.status, UploadStatus::Pending | UploadStatus::Uploading { .. })));
        assert_eq!(queue.errors(), &[UPLOAD_FAILED.to_string()]);

        let failed: Vec<_> = queue
            .items()
            .iter()
            .filter(|i| !i.status.is_success())
            .map(|i| i.source.name())
            .collect();
        assert_eq!(failed, vec!["b.txt"]);

        let rows = backend.files();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.receiver_id == "ABCD1234"));
        assert!(rows.iter().all(|r| r.session_id.as_deref() == Some("ABCD1234")));

        assert!(matches!(
            report.into_result(),
            Err(ClientError::PartialBatchFailure { succeeded: 2, failed: 1 })
        ));
    }

    #[tokio::test]
    async fn test_uploads_run_in_queue_order_and_skip_successes() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::signed_in("sender");
        let user = signed_in_user(&backend).await;

        let mut queue = UploadQueue::new(multi());
        queue.add(vec![
            write_file(&dir, "one.txt", b"1").await,
            write_file(&dir, "two.txt", b"22").await,
        ]);

        let destination = Destination::Receiver("friend".to_string());
        upload_all(&mut queue, &backend, &destination, Some(&user))
            .await
            .unwrap();

        let paths = backend.uploaded_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].starts_with("sender/") && paths[0].ends_with("-one.txt"));
        assert!(paths[1].ends_with("-two.txt"));
        assert!(backend.files().iter().all(|r| r.session_id.is_none()));

        // A second run has nothing left to send
        let report = upload_all(&mut queue, &backend, &destination, Some(&user))
            .await
            .unwrap();
        assert_eq!(report, UploadReport::default());
        assert_eq!(backend.uploaded_paths().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_user_leaves_queue_untouched() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();

        let mut queue = UploadQueue::new(multi());
        queue.add(vec![write_file(&dir, "a.txt", b"a").await]);

        let destination = Destination::Session("ABCD1234".to_string());
        let result = upload_all(&mut queue, &backend, &destination, None).await;

        assert!(matches!(result, Err(ClientError::AuthRequired)));
        assert_eq!(queue.items()[0].status, UploadStatus::Pending);
        assert!(backend.uploaded_paths().is_empty());
    }
}
