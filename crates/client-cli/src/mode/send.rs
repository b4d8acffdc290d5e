use anyhow::{bail, Result};
use shared::User;
use std::path::PathBuf;

use crate::backend::Backend;
use crate::format::format_bytes;
use crate::session::{parse_target, require_valid_session};
use crate::upload::{upload_all, Destination, FileSource, LocalFile, UploadOptions, UploadQueue, UploadReport};

#[derive(Debug, Clone)]
pub struct SendArgs {
    /// Session id, receiver id or upload link
    pub target: String,
    pub files: Vec<PathBuf>,
    /// Treat the target as a user's inbox rather than a session
    pub to_user: bool,
}

/// Validate the destination, queue the files and upload them in order.
pub async fn run(
    backend: &dyn Backend,
    user: Option<&User>,
    options: UploadOptions,
    args: SendArgs,
) -> Result<UploadReport> {
    let Some(target) = parse_target(&args.target) else {
        bail!("Not a session id or upload link: {}", args.target);
    };

    let destination = if args.to_user {
        Destination::Receiver(target)
    } else {
        require_valid_session(backend, &target).await?;
        Destination::Session(target)
    };

    let mut sources = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match LocalFile::open(path).await {
            Ok(file) => sources.push(FileSource::Local(file)),
            Err(e) => eprintln!("\x1b[33m⚠ Skipping {}: {}\x1b[0m", path.display(), e),
        }
    }

    let mut queue = UploadQueue::new(options);
    queue.add(sources);
    for error in queue.errors() {
        eprintln!("\x1b[33m⚠ {}\x1b[0m", error);
    }
    if queue.is_empty() {
        bail!("No files to upload");
    }

    let stats = queue.stats();
    println!(
        "Uploading {} file(s), {} to {}",
        stats.total,
        format_bytes(stats.total_bytes),
        destination.receiver_id()
    );

    queue.clear_errors();
    let report = upload_all(&mut queue, backend, &destination, user).await?;

    for item in queue.items() {
        if item.status.is_success() {
            println!("\x1b[32m✓\x1b[0m {}", item.source.name());
        } else {
            println!("\x1b[31m✗\x1b[0m {} ({})", item.source.name(), item.status);
        }
    }
    println!(
        "\x1b[1m{} uploaded, {} failed\x1b[0m",
        report.succeeded, report.failed
    );

    Ok(report.into_result()?)
}
