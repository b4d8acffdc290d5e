//! Operations on stored files: upload one, list, update, delete and download.

use chrono::Utc;
use futures::future::join_all;
use shared::{object_path_from_url, FileFilter, FilePatch, FileRecord, NewFileRecord};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::backend::{Backend, ObjectOptions};
use crate::error::{ClientError, Result};
use crate::upload::LocalFile;

/// Everything needed to send one local file
#[derive(Debug, Clone, Copy)]
pub struct UploadPayload<'a> {
    pub receiver_id: &'a str,
    pub session_id: Option<&'a str>,
    pub user_id: &'a str,
    pub file: &'a LocalFile,
}

/// Replace anything outside `[A-Za-z0-9._-]` so the name is safe inside an object path
pub fn sanitize_object_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// `<user_id>/<unix millis>-<name>`
pub fn object_path(user_id: &str, name: &str, millis: i64) -> String {
    format!("{}/{}-{}", user_id, millis, sanitize_object_name(name))
}

/// Store the file's bytes, then record it in the `files` table.
pub async fn upload_file(backend: &dyn Backend, payload: UploadPayload<'_>) -> Result<FileRecord> {
    if payload.receiver_id.is_empty() || payload.user_id.is_empty() {
        return Err(ClientError::Validation(
            "Missing receiver or user id".to_string(),
        ));
    }

    let file = payload.file;
    let bytes = file.read().await.map_err(crate::error::BackendError::from)?;
    let path = object_path(payload.user_id, &file.name, Utc::now().timestamp_millis());

    let options = ObjectOptions {
        content_type: Some(file.mime_type.clone()),
        ..Default::default()
    };
    let stored = backend.upload_object(&path, bytes, &options).await?;
    let url = backend.public_url(&stored);

    let record = backend
        .insert_file(&NewFileRecord {
            user_id: payload.user_id.to_string(),
            receiver_id: payload.receiver_id.to_string(),
            session_id: payload.session_id.map(str::to_string),
            name: file.name.clone(),
            size: file.size as i64,
            mime_type: file.mime_type.clone(),
            url,
        })
        .await?;

    tracing::debug!("Stored {} at {}", record.name, stored);
    Ok(record)
}

/// Files the signed-in user sent or received. Failures yield an empty list.
pub async fn current_user_files(backend: &dyn Backend) -> Vec<FileRecord> {
    let user = match backend.get_current_user().await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("No signed-in user; no files to list");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!("Error fetching user: {}", e);
            return Vec::new();
        }
    };

    match backend.query_files(&FileFilter::involving(&user.id)).await {
        Ok(files) => files
            .into_iter()
            // Receivers no longer see rows they deleted; uploaders still do
            .filter(|f| !(f.is_deleted && !f.is_owned_by(&user.id)))
            .collect(),
        Err(e) => {
            tracing::error!("Error fetching files: {}", e);
            Vec::new()
        }
    }
}

pub async fn update_files(
    backend: &dyn Backend,
    ids: &[String],
    patch: &FilePatch,
) -> Result<Vec<FileRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(backend.update_files(ids, patch).await?)
}

/// Outcome of [`delete_files`], by file id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Object and row removed
    pub hard_deleted: Vec<String>,
    /// Flagged `is_deleted` for the receiver
    pub soft_deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Delete `files` on behalf of `actor`.
///
/// Files the actor uploaded lose their stored object and then their row; a
/// row is kept when its object could not be removed. Files the actor only
/// received are flagged deleted and nothing is removed.
pub async fn delete_files(backend: &dyn Backend, files: &[FileRecord], actor: &str) -> DeleteReport {
    let mut report = DeleteReport::default();
    let (owned, received): (Vec<&FileRecord>, Vec<&FileRecord>) =
        files.iter().partition(|f| f.is_owned_by(actor));

    let mut removable = Vec::new();
    for file in owned {
        match object_path_from_url(&file.url) {
            Some(path) => match backend.remove_objects(&[path.to_string()]).await {
                Ok(()) => removable.push(file.id.clone()),
                Err(e) => {
                    tracing::error!("Error removing object for {}: {}", file.name, e);
                    report.failed.push(file.id.clone());
                }
            },
            None => {
                tracing::warn!("No stored object for {}; deleting row only", file.name);
                removable.push(file.id.clone());
            }
        }
    }

    if !removable.is_empty() {
        match backend.delete_files(&removable, actor).await {
            Ok(()) => report.hard_deleted.extend(removable),
            Err(e) => {
                // Objects are already gone; the rows stay behind
                tracing::error!("Error deleting {} file rows: {}", removable.len(), e);
                report.failed.extend(removable);
            }
        }
    }

    let received_ids: Vec<String> = received.iter().map(|f| f.id.clone()).collect();
    if !received_ids.is_empty() {
        match backend.update_files(&received_ids, &FilePatch::soft_delete()).await {
            Ok(updated) => {
                let flagged: HashSet<String> = updated.into_iter().map(|f| f.id).collect();
                for id in received_ids {
                    if flagged.contains(&id) {
                        report.soft_deleted.push(id);
                    } else {
                        // Neither uploaded nor received by the actor
                        tracing::warn!("File {} was not deleted: not visible to {}", id, actor);
                        report.failed.push(id);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Error marking files deleted: {}", e);
                report.failed.extend(received_ids);
            }
        }
    }

    report
}

/// Fetch every file concurrently and write the ones that arrive into `dest_dir`.
///
/// Files whose URL does not point into the public bucket, and downloads or
/// writes that fail, are skipped. Returns the written paths.
pub async fn download_files(
    backend: &dyn Backend,
    files: &[FileRecord],
    dest_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let fetches = files.iter().filter_map(|file| {
        let Some(path) = object_path_from_url(&file.url) else {
            tracing::warn!("Skipping {}: not a stored object URL", file.name);
            return None;
        };
        Some(async move { (file, backend.download_object(path).await) })
    });

    let results = join_all(fetches).await;

    tokio::fs::create_dir_all(dest_dir).await?;
    let mut taken = HashSet::new();
    let mut written = Vec::new();
    for (file, result) in results {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Error downloading {}: {}", file.name, e);
                continue;
            }
        };

        let target = unique_target(dest_dir, &local_file_name(&file.name), &mut taken);
        if let Err(e) = tokio::fs::write(&target, bytes).await {
            tracing::error!("Error writing {}: {}", target.display(), e);
            continue;
        }
        written.push(target);
    }

    Ok(written)
}

/// Final path component only, so a stored name cannot escape the target directory
fn local_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

/// `name`, or `stem (n).ext` when already used in this batch or on disk
fn unique_target(dir: &Path, name: &str, taken: &mut HashSet<String>) -> PathBuf {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (name.to_string(), String::new()),
    };

    let mut candidate = name.to_string();
    let mut n = 1;
    while taken.contains(&candidate) || dir.join(&candidate).exists() {
        candidate = format!("{} ({}){}", stem, n, ext);
        n += 1;
    }
    taken.insert(candidate.clone());
    dir.join(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use shared::BUCKET;
    use tempfile::TempDir;

    fn record(id: &str, user_id: &str, receiver_id: &str, name: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            receiver_id: receiver_id.to_string(),
            session_id: None,
            name: name.to_string(),
            size: name.len() as i64,
            mime_type: "text/plain".to_string(),
            url: format!(
                "memory://storage/object/public/{}/{}/1-{}",
                BUCKET, user_id, name
            ),
            created_at: Utc::now(),
            is_deleted: false,
        }
    }

    #[test]
    fn test_object_path_sanitizes_name() {
        assert_eq!(object_path("u1", "my photo (1).png", 42), "u1/42-my_photo__1_.png");
        assert_eq!(object_path("u1", "", 7), "u1/7-file");
    }

    #[tokio::test]
    async fn test_upload_file_stores_object_then_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let file = LocalFile::open(&path).await.unwrap();

        let backend = MemoryBackend::signed_in("u1");
        let record = upload_file(
            &backend,
            UploadPayload {
                receiver_id: "S1",
                session_id: Some("S1"),
                user_id: "u1",
                file: &file,
            },
        )
        .await
        .unwrap();

        assert_eq!(record.name, "hello.txt");
        assert_eq!(record.size, 5);
        assert_eq!(record.mime_type, "text/plain");
        let stored = object_path_from_url(&record.url).unwrap();
        assert!(stored.starts_with("u1/"));
        assert!(backend.has_object(stored));
    }

    #[tokio::test]
    async fn test_upload_file_rejects_empty_ids() {
        let file = LocalFile {
            path: "x".into(),
            name: "x".to_string(),
            size: 1,
            mime_type: "text/plain".to_string(),
        };
        let backend = MemoryBackend::signed_in("u1");
        let result = upload_file(
            &backend,
            UploadPayload {
                receiver_id: "",
                session_id: None,
                user_id: "u1",
                file: &file,
            },
        )
        .await;
        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn test_receiver_delete_only_flags_rows() {
        let backend = MemoryBackend::signed_in("me");
        let a = record("a", "other", "me", "a.txt");
        let b = record("b", "other", "me", "b.txt");
        let c = record("c", "other", "me", "c.txt");
        for r in [&a, &b, &c] {
            backend.put_file(r.clone());
        }

        let report = delete_files(&backend, &[a.clone(), b.clone()], "me").await;

        assert_eq!(report.soft_deleted, vec!["a".to_string(), "b".to_string()]);
        assert!(report.hard_deleted.is_empty());
        let rows = backend.files();
        assert_eq!(rows.len(), 3);
        let flagged: Vec<_> = rows.iter().filter(|r| r.is_deleted).map(|r| r.id.as_str()).collect();
        assert_eq!(flagged, vec!["a", "b"]);
        assert_eq!(backend.object_count(), 3);
    }

    #[tokio::test]
    async fn test_owner_delete_removes_object_and_row() {
        let backend = MemoryBackend::signed_in("me");
        let a = record("a", "me", "S1", "a.txt");
        backend.put_file(a.clone());

        let report = delete_files(&backend, &[a.clone()], "me").await;

        assert_eq!(report.hard_deleted, vec!["a".to_string()]);
        assert!(backend.files().is_empty());
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_that_row() {
        let backend = MemoryBackend::signed_in("me");
        let a = record("a", "me", "S1", "a.txt");
        let b = record("b", "me", "S1", "b.txt");
        backend.put_file(a.clone());
        backend.put_file(b.clone());
        backend.fail_removal_of("me/1-a.txt");

        let report = delete_files(&backend, &[a, b], "me").await;

        assert_eq!(report.failed, vec!["a".to_string()]);
        assert_eq!(report.hard_deleted, vec!["b".to_string()]);
        let remaining: Vec<_> = backend.files().into_iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec!["a".to_string()]);
        assert!(backend.has_object("me/1-a.txt"));
    }

    #[tokio::test]
    async fn test_row_failure_after_storage_removal_is_reported() {
        let backend = MemoryBackend::signed_in("me");
        let a = record("a", "me", "S1", "a.txt");
        backend.put_file(a.clone());
        backend.fail_row_deletes();

        let report = delete_files(&backend, &[a], "me").await;

        assert_eq!(report.failed, vec!["a".to_string()]);
        assert_eq!(backend.files().len(), 1);
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_unrelated_file_is_reported_failed() {
        let backend = MemoryBackend::signed_in("me");
        let stranger = record("x", "bob", "carol", "x.txt");
        let mine = record("r", "other", "me", "r.txt");
        backend.put_file(stranger.clone());
        backend.put_file(mine.clone());

        let report = delete_files(&backend, &[stranger, mine], "me").await;

        assert_eq!(report.soft_deleted, vec!["r".to_string()]);
        assert_eq!(report.failed, vec!["x".to_string()]);
        assert!(report.hard_deleted.is_empty());
        let untouched = backend.files().into_iter().find(|f| f.id == "x").unwrap();
        assert!(!untouched.is_deleted);
    }

    #[tokio::test]
    async fn test_current_user_files_hides_received_deleted() {
        let backend = MemoryBackend::signed_in("me");
        let mut received_deleted = record("a", "other", "me", "a.txt");
        received_deleted.is_deleted = true;
        let mut sent_deleted_by_receiver = record("b", "me", "other", "b.txt");
        sent_deleted_by_receiver.is_deleted = true;
        backend.put_file(received_deleted);
        backend.put_file(sent_deleted_by_receiver);
        backend.put_file(record("c", "other", "me", "c.txt"));
        backend.put_file(record("d", "x", "y", "d.txt"));

        let ids: Vec<_> = current_user_files(&backend)
            .await
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);

        assert!(current_user_files(&MemoryBackend::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_download_skips_failures_and_dedupes_names() {
        let backend = MemoryBackend::signed_in("me");
        let a = record("a", "me", "S1", "a.txt");
        let mut a_again = record("a2", "other", "me", "a.txt");
        a_again.url = format!("memory://storage/object/public/{}/other/2-a.txt", BUCKET);
        let mut foreign = record("f", "me", "S1", "f.txt");
        foreign.url = "https://elsewhere.example/f.txt".to_string();
        let missing = record("m", "me", "S1", "missing.txt");
        backend.put_file(a.clone());
        backend.put_file(a_again.clone());

        let dir = TempDir::new().unwrap();
        let written = download_files(&backend, &[a, a_again, foreign, missing], dir.path())
            .await
            .unwrap();

        assert_eq!(
            written,
            vec![dir.path().join("a.txt"), dir.path().join("a (1).txt")]
        );
        assert_eq!(tokio::fs::read(&written[0]).await.unwrap(), b"a.txt");
    }

    #[tokio::test]
    async fn test_download_write_failure_does_not_stop_batch() {
        let backend = MemoryBackend::signed_in("me");
        // NUL is rejected by the filesystem, so only this write fails
        let unwritable = record("bad", "me", "S1", "bad\0name.txt");
        let good = record("good", "me", "S1", "good.txt");
        backend.put_file(unwritable.clone());
        backend.put_file(good.clone());

        let dir = TempDir::new().unwrap();
        let written = download_files(&backend, &[unwritable, good], dir.path())
            .await
            .unwrap();

        assert_eq!(written, vec![dir.path().join("good.txt")]);
        assert_eq!(tokio::fs::read(&written[0]).await.unwrap(), b"good.txt");
    }

    #[test]
    fn test_local_file_name_strips_directories() {
        assert_eq!(local_file_name("../../etc/passwd"), "passwd");
        assert_eq!(local_file_name(".."), "download");
    }
}
