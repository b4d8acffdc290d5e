use super::item::FileSource;
use crate::format::format_bytes;

/// Accept list value meaning "any type"
pub const ACCEPT_ANY: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Largest accepted file, in bytes
    pub max_size: u64,
    /// Most files the queue may hold; `None` is unbounded
    pub max_files: Option<usize>,
    /// `*`, or a comma separated list of MIME types, `type/*` wildcards and `.ext` extensions
    pub accept: String,
    pub multiple: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_size: u64::MAX,
            max_files: None,
            accept: ACCEPT_ANY.to_string(),
            multiple: false,
        }
    }
}

/// `None` when `file` may be queued, otherwise the reason it may not
pub fn validate_file(file: &FileSource, options: &UploadOptions) -> Option<String> {
    if file.size() > options.max_size {
        return Some(format!(
            "File \"{}\" exceeds the maximum size of {}.",
            file.name(),
            format_bytes(options.max_size)
        ));
    }

    if !is_accepted_type(file.name(), file.mime_type(), &options.accept) {
        return Some(format!(
            "File \"{}\" is not an accepted file type.",
            file.name()
        ));
    }

    None
}

pub fn is_accepted_type(name: &str, mime_type: &str, accept: &str) -> bool {
    if accept.trim() == ACCEPT_ANY {
        return true;
    }

    // Text after the last dot, or the whole name when there is none
    let extension = format!(".{}", name.rsplit('.').next().unwrap_or(name));

    accept
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry.starts_with('.') {
                extension.eq_ignore_ascii_case(entry)
            } else if let Some(base) = entry.strip_suffix("/*") {
                mime_type.starts_with(&format!("{}/", base))
            } else {
                mime_type == entry
            }
        })
}

/// Same name and size as something already in `existing`
pub fn is_duplicate<'a>(file: &FileSource, mut existing: impl Iterator<Item = &'a FileSource>) -> bool {
    existing.any(|other| other.is_same_file(file))
}
