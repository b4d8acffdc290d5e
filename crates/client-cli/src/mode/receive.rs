use anyhow::{bail, Context, Result};
use qrcode::render::unicode;
use qrcode::QrCode;
use shared::FileRecord;

use crate::backend::Backend;
use crate::format::format_bytes;
use crate::realtime::{ListenScope, RealtimeListener, DEFAULT_CAPACITY};
use crate::session::{create_session, upload_url};
use crate::store::AppStore;

/// QR code for `url`, drawn with half-height unicode blocks
pub fn render_qr(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes()).context("Failed to generate QR code")?;

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

/// One line announcing a received file
pub fn describe_file(file: &FileRecord) -> String {
    format!(
        "\x1b[1;32m📥 {}\x1b[0m  {}  {}\n   \x1b[90m{}\x1b[0m",
        file.name,
        format_bytes(file.size.max(0) as u64),
        file.mime_type,
        file.url
    )
}

/// Open a receive session (or the user's inbox with `inbox`), show the link
/// and print files as they arrive until interrupted.
pub async fn run(backend: &dyn Backend, store: &mut AppStore, origin: &str, inbox: bool) -> Result<()> {
    let Some(user_id) = store.user().map(|u| u.id.clone()) else {
        bail!("Not signed in");
    };
    let (scope, link) = if inbox {
        let link = upload_url(origin, &user_id);
        (ListenScope::ReceiverId(user_id), link)
    } else {
        let link = create_session(backend, origin)
            .await
            .context("Failed to create session")?;
        println!(
            "\x1b[90mSession {} expires {}\x1b[0m",
            link.session.id,
            link.session.expires_at.format("%Y-%m-%d %H:%M UTC")
        );
        (ListenScope::SessionId(link.session.id), link.upload_url)
    };

    let mut listener = RealtimeListener::start(backend, scope, DEFAULT_CAPACITY)
        .await
        .context("Failed to subscribe for new files")?;

    println!();
    println!("{}", render_qr(&link)?);
    println!("\x1b[1;36m📱 Scan the code or open:\x1b[0m \x1b[4m{}\x1b[0m", link);
    println!("\x1b[90mWaiting for files... (Ctrl+C to stop)\x1b[0m");
    println!();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            file = listener.next() => match file {
                Some(file) => {
                    println!("{}", describe_file(file));
                    store.push_file(file.clone());
                }
                None => {
                    eprintln!("\x1b[33mRealtime feed closed\x1b[0m");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    listener.unsubscribe();
    println!();
    println!("Received {} file(s)", store.files().len());
    Ok(())
}
