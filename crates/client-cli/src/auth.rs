//! Anonymous sign-in and login status

use anyhow::Result;
use shared::User;

use crate::backend::Backend;
use crate::config::{Config, RemoteConfig};

/// Return the signed-in user, signing in anonymously when there is none.
///
/// A fresh sign-in records the new token and user id in `remote`; the caller
/// decides when to save it.
pub async fn ensure_user(backend: &dyn Backend, remote: &mut RemoteConfig) -> Result<User> {
    if let Some(user) = backend.get_current_user().await? {
        remote.user_id = Some(user.id.clone());
        return Ok(user);
    }

    tracing::info!("No stored session, signing in anonymously");
    let user = backend.create_anonymous_user().await?;
    remote.token = backend.access_token();
    remote.user_id = Some(user.id.clone());
    Ok(user)
}

/// Logout by clearing the stored token
pub fn logout(config: &mut Config) -> Result<()> {
    config.remote.token = None;
    config.remote.user_id = None;
    config.save()?;
    println!("\x1b[32m✅ Logged out successfully\x1b[0m");
    Ok(())
}

/// Show current login status
pub async fn whoami(backend: &dyn Backend, server_url: &str) -> Result<()> {
    match backend.get_current_user().await? {
        Some(user) => {
            println!("\x1b[32m✓ Logged in\x1b[0m");
            println!("Server: {}", server_url);
            println!("User ID: {}", user.id);
            if user.is_anonymous {
                println!("\x1b[90m(anonymous)\x1b[0m");
            }
        }
        None => {
            println!("\x1b[33m✗ Not logged in\x1b[0m");
            println!("Run '\x1b[1mdropsync login\x1b[0m' to sign in");
        }
    }
    Ok(())
}
