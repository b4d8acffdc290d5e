use shared::FileRecord;

use super::item::{generate_item_id, FileSource, Preview, PreviewRegistry, UploadItem, UploadStatus};
use super::validation::{is_duplicate, validate_file, UploadOptions};

/// Derived counts over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub success: usize,
    pub error: usize,
    pub total_bytes: u64,
}

/// Ordered list of files picked for upload, plus the errors from the last add
#[derive(Debug)]
pub struct UploadQueue {
    options: UploadOptions,
    items: Vec<UploadItem>,
    errors: Vec<String>,
    previews: PreviewRegistry,
}

impl UploadQueue {
    pub fn new(options: UploadOptions) -> Self {
        Self {
            options,
            items: Vec::new(),
            errors: Vec::new(),
            previews: PreviewRegistry::default(),
        }
    }

    /// Queue seeded with files that are already stored; they start out as uploaded
    pub fn with_initial_files(options: UploadOptions, files: Vec<FileRecord>) -> Self {
        let mut queue = Self::new(options);
        queue.items = files
            .into_iter()
            .map(|record| UploadItem {
                id: record.id.clone(),
                preview: Preview::Remote(record.url.clone()),
                source: FileSource::Remote(record),
                status: UploadStatus::Success,
            })
            .collect();
        queue
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validate `candidates` and queue the ones that pass. Returns the ids
    /// of the newly queued items; rejections land in [`UploadQueue::errors`].
    pub fn add(&mut self, candidates: Vec<FileSource>) -> Vec<String> {
        if candidates.is_empty() {
            return Vec::new();
        }
        self.errors.clear();

        let mut candidates = candidates;
        if !self.options.multiple {
            self.clear();
            candidates.truncate(1);
        }

        if self.options.multiple {
            if let Some(max_files) = self.options.max_files {
                if self.items.len() + candidates.len() > max_files {
                    self.errors
                        .push(format!("You can only upload a maximum of {} files.", max_files));
                    return Vec::new();
                }
            }
        }

        let mut accepted: Vec<UploadItem> = Vec::new();
        for candidate in candidates {
            if self.options.multiple {
                let known = self.items.iter().chain(accepted.iter()).map(|i| &i.source);
                if is_duplicate(&candidate, known) {
                    tracing::debug!("Skipping duplicate {}", candidate.name());
                    continue;
                }
            }

            if let Some(reason) = validate_file(&candidate, &self.options) {
                self.errors.push(reason);
                continue;
            }

            accepted.push(self.make_item(candidate));
        }

        let ids = accepted.iter().map(|i| i.id.clone()).collect();
        self.items.extend(accepted);
        ids
    }

    fn make_item(&mut self, source: FileSource) -> UploadItem {
        match source {
            FileSource::Local(file) => UploadItem {
                id: generate_item_id(&file.name),
                preview: Preview::Blob(self.previews.create()),
                source: FileSource::Local(file),
                status: UploadStatus::Pending,
            },
            FileSource::Remote(record) => UploadItem {
                id: record.id.clone(),
                preview: Preview::Remote(record.url.clone()),
                source: FileSource::Remote(record),
                status: UploadStatus::Success,
            },
        }
    }

    fn release_preview(&mut self, preview: &Preview) {
        if let Preview::Blob(handle) = preview {
            self.previews.revoke(*handle);
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.items.iter().position(|i| i.id == id) else {
            return false;
        };
        let item = self.items.remove(index);
        self.release_preview(&item.preview);
        self.errors.clear();
        true
    }

    pub fn clear(&mut self) {
        let items = std::mem::take(&mut self.items);
        for item in &items {
            self.release_preview(&item.preview);
        }
        self.errors.clear();
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn stats(&self) -> QueueStats {
        self.items.iter().fold(QueueStats::default(), |mut stats, item| {
            stats.total += 1;
            stats.total_bytes += item.source.size();
            match item.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading { .. } => stats.uploading += 1,
                UploadStatus::Success => stats.success += 1,
                UploadStatus::Error { .. } => stats.error += 1,
            }
            stats
        })
    }

    pub fn get(&self, id: &str) -> Option<&UploadItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Ids of items that still need sending, in queue order
    pub(crate) fn unsent_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| !i.status.is_success())
            .map(|i| i.id.clone())
            .collect()
    }

    pub(crate) fn set_status(&mut self, id: &str, status: UploadStatus) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.status = status;
        }
    }

    pub(crate) fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::item::LocalFile;
    use chrono::Utc;

    const MB: u64 = 1024 * 1024;

    fn local(name: &str, size: u64) -> FileSource {
        FileSource::Local(LocalFile {
            path: name.into(),
            name: name.to_string(),
            size,
            mime_type: "image/png".to_string(),
        })
    }

    fn multi(max_size: u64, max_files: Option<usize>) -> UploadOptions {
        UploadOptions {
            max_size,
            max_files,
            multiple: true,
            ..Default::default()
        }
    }

    fn record(id: &str, name: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            session_id: None,
            name: name.to_string(),
            size: 5,
            mime_type: "text/plain".to_string(),
            url: format!("http://h/storage/object/public/file_uploads/u1/{}", name),
            created_at: Utc::now(),
            is_deleted: false,
        }
    }

    #[test]
    fn test_oversized_file_never_queued() {
        let mut queue = UploadQueue::new(multi(MB, None));
        let ids = queue.add(vec![local("small.png", MB), local("huge.png", MB + 1)]);

        assert_eq!(ids.len(), 1);
        assert_eq!(queue.items().len(), 1);
        assert_eq!(queue.items()[0].source.name(), "small.png");
        assert_eq!(queue.errors().len(), 1);
        assert!(queue.errors()[0].contains("huge.png"));
        assert!(queue.errors()[0].contains("exceeds the maximum size of 1 MB"));
    }

    #[test]
    fn test_duplicate_in_same_batch_yields_one_entry() {
        let mut queue = UploadQueue::new(multi(10 * MB, None));
        queue.add(vec![local("a.png", MB), local("a.png", MB)]);

        assert_eq!(queue.items().len(), 1);
        assert!(queue.errors().is_empty());
    }

    #[test]
    fn test_duplicate_of_queued_file_silently_dropped() {
        let mut queue = UploadQueue::new(multi(10 * MB, None));
        queue.add(vec![local("a.png", MB)]);
        let ids = queue.add(vec![local("a.png", MB), local("b.png", MB)]);

        assert_eq!(ids.len(), 1);
        assert_eq!(queue.items().len(), 2);
        assert!(queue.errors().is_empty());
    }

    #[test]
    fn test_single_mode_keeps_only_newest_valid_file() {
        let mut queue = UploadQueue::new(UploadOptions::default());
        queue.add(vec![local("first.png", 1)]);
        let first_preview = match queue.items()[0].preview {
            Preview::Blob(handle) => handle,
            _ => panic!("local files get blob previews"),
        };

        queue.add(vec![local("second.png", 2), local("third.png", 3)]);

        assert_eq!(queue.items().len(), 1);
        assert_eq!(queue.items()[0].source.name(), "second.png");
        assert!(!queue.previews().is_live(first_preview));
    }

    #[test]
    fn test_single_mode_does_not_dedupe() {
        let mut queue = UploadQueue::new(UploadOptions::default());
        queue.add(vec![local("a.png", 1)]);
        queue.add(vec![local("a.png", 1)]);
        assert_eq!(queue.items().len(), 1);
    }

    #[test]
    fn test_max_files_rejects_whole_batch() {
        let mut queue = UploadQueue::new(multi(10 * MB, Some(2)));
        queue.add(vec![local("a.png", 1)]);
        let ids = queue.add(vec![local("b.png", 1), local("c.png", 1)]);

        assert!(ids.is_empty());
        assert_eq!(queue.items().len(), 1);
        assert_eq!(
            queue.errors(),
            &["You can only upload a maximum of 2 files.".to_string()]
        );
    }

    #[test]
    fn test_add_clears_previous_errors() {
        let mut queue = UploadQueue::new(multi(MB, None));
        queue.add(vec![local("huge.png", 2 * MB)]);
        assert_eq!(queue.errors().len(), 1);

        queue.add(vec![local("ok.png", 1)]);
        assert!(queue.errors().is_empty());
    }

    #[test]
    fn test_remove_and_clear_revoke_blob_previews() {
        let mut queue = UploadQueue::new(multi(10 * MB, None));
        let ids = queue.add(vec![local("a.png", 1), local("b.png", 2), local("c.png", 3)]);
        assert_eq!(queue.previews().live_count(), 3);

        assert!(queue.remove(&ids[0]));
        assert!(!queue.remove(&ids[0]));
        assert_eq!(queue.previews().live_count(), 2);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.previews().live_count(), 0);
    }

    #[test]
    fn test_initial_files_use_remote_previews() {
        let files = vec![record("f1", "a.txt")];
        let mut queue = UploadQueue::with_initial_files(multi(10 * MB, None), files);

        let item = &queue.items()[0];
        assert_eq!(item.id, "f1");
        assert_eq!(
            item.preview,
            Preview::Remote("http://h/storage/object/public/file_uploads/u1/a.txt".to_string())
        );
        assert!(item.status.is_success());

        queue.clear();
        assert_eq!(queue.previews().live_count(), 0);
    }

    #[test]
    fn test_stats() {
        let mut queue = UploadQueue::new(multi(10 * MB, None));
        let ids = queue.add(vec![local("a.png", 100), local("b.png", 200), local("c.png", 300)]);
        queue.set_status(&ids[0], UploadStatus::Success);
        queue.set_status(
            &ids[1],
            UploadStatus::Error {
                reason: "Failed to upload file".to_string(),
            },
        );

        assert_eq!(
            queue.stats(),
            QueueStats {
                total: 3,
                pending: 1,
                uploading: 0,
                success: 1,
                error: 1,
                total_bytes: 600,
            }
        );
        assert_eq!(queue.unsent_ids(), vec![ids[1].clone(), ids[2].clone()]);
    }
}
