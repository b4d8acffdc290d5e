use anyhow::{bail, Result};
use shared::FileRecord;
use std::path::Path;

use crate::actions::{current_user_files, delete_files, download_files, DeleteReport};
use crate::backend::Backend;
use crate::format::format_bytes;
use crate::store::AppStore;

/// Load the signed-in user's files into `store`
pub async fn refresh(backend: &dyn Backend, store: &mut AppStore) {
    store.set_files(current_user_files(backend).await);
}

fn print_table(title: &str, files: &[&FileRecord]) {
    println!("\x1b[1m{}\x1b[0m ({})", title, files.len());
    for file in files {
        let flag = if file.is_deleted { " \x1b[90m(deleted by receiver)\x1b[0m" } else { "" };
        println!(
            "  {}  {:<32} {:>10}  {}{}",
            file.id,
            file.name,
            format_bytes(file.size.max(0) as u64),
            file.created_at.format("%Y-%m-%d %H:%M"),
            flag
        );
    }
}

pub async fn list(backend: &dyn Backend, store: &mut AppStore) -> Result<()> {
    refresh(backend, store).await;
    print_table("Received", &store.received_files());
    println!();
    print_table("Sent", &store.sent_files());
    Ok(())
}

/// Files in `store` with the given ids; unknown ids are an error
fn select(store: &AppStore, ids: &[String]) -> Result<Vec<FileRecord>> {
    let mut selected = Vec::with_capacity(ids.len());
    for id in ids {
        match store.find(id) {
            Some(file) => selected.push(file.clone()),
            None => bail!("No file with id {}", id),
        }
    }
    Ok(selected)
}

pub async fn delete(backend: &dyn Backend, store: &mut AppStore, ids: &[String]) -> Result<DeleteReport> {
    let Some(actor) = store.user().map(|u| u.id.clone()) else {
        bail!("Not signed in");
    };
    refresh(backend, store).await;
    let selected = select(store, ids)?;

    let report = delete_files(backend, &selected, &actor).await;
    store.apply_delete(&report);

    if !report.hard_deleted.is_empty() {
        println!("\x1b[32m🗑 Deleted {} file(s)\x1b[0m", report.hard_deleted.len());
    }
    if !report.soft_deleted.is_empty() {
        println!("\x1b[32m🗑 Removed {} received file(s)\x1b[0m", report.soft_deleted.len());
    }
    for id in &report.failed {
        eprintln!("\x1b[31m✗ Could not delete {}\x1b[0m", id);
    }
    Ok(report)
}

pub async fn download(
    backend: &dyn Backend,
    store: &mut AppStore,
    ids: &[String],
    dest_dir: &Path,
) -> Result<()> {
    refresh(backend, store).await;
    let selected = select(store, ids)?;

    let written = download_files(backend, &selected, dest_dir).await?;
    for path in &written {
        println!("\x1b[32m⬇\x1b[0m {}", path.display());
    }
    if written.len() < selected.len() {
        eprintln!(
            "\x1b[33m{} of {} download(s) failed\x1b[0m",
            selected.len() - written.len(),
            selected.len()
        );
    }
    Ok(())
}
