use shared::{FileRecord, User};

use crate::actions::DeleteReport;

/// Application state: who is signed in and the files they can see
#[derive(Debug, Default)]
pub struct AppStore {
    user: Option<User>,
    files: Vec<FileRecord>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn set_files(&mut self, files: Vec<FileRecord>) {
        self.files = files;
    }

    /// Add a record unless one with the same id is already present
    pub fn push_file(&mut self, file: FileRecord) -> bool {
        if self.files.iter().any(|f| f.id == file.id) {
            return false;
        }
        self.files.push(file);
        true
    }

    pub fn find(&self, id: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Files sent to the signed-in user that they have not deleted
    pub fn received_files(&self) -> Vec<&FileRecord> {
        let Some(user) = &self.user else {
            return Vec::new();
        };
        self.files
            .iter()
            .filter(|f| f.is_received_by(&user.id) && !f.is_deleted)
            .collect()
    }

    pub fn sent_files(&self) -> Vec<&FileRecord> {
        let Some(user) = &self.user else {
            return Vec::new();
        };
        self.files.iter().filter(|f| f.is_owned_by(&user.id)).collect()
    }

    /// Reflect a finished delete: hard deletes vanish, soft deletes are flagged
    pub fn apply_delete(&mut self, report: &DeleteReport) {
        self.files.retain(|f| !report.hard_deleted.contains(&f.id));
        for file in self.files.iter_mut() {
            if report.soft_deleted.contains(&file.id) {
                file.is_deleted = true;
            }
        }
    }
}
