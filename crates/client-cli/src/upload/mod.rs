//! Picking files, validating them and sending them to the backend.

pub mod driver;
pub mod item;
pub mod queue;
pub mod validation;

pub use driver::{upload_all, Destination, UploadReport};
pub use item::{FileSource, LocalFile, Preview, UploadItem, UploadStatus};
pub use queue::{QueueStats, UploadQueue};
pub use validation::UploadOptions;
