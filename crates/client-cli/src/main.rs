use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod actions;
mod auth;
mod backend;
mod config;
mod error;
mod format;
mod mode;
mod realtime;
mod session;
mod store;
mod upload;

use backend::HttpBackend;
use config::Config;
use store::AppStore;

#[derive(Parser)]
#[command(name = "dropsync")]
#[command(about = "Share files through QR codes and short-lived upload links")]
#[command(version = env!("DROPSYNC_VERSION"))]
struct Cli {
    /// Server URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Auth token (overrides config)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session, show its QR code and print files as they arrive
    Receive {
        /// Origin used in the upload link (defaults to the server URL)
        #[arg(long)]
        origin: Option<String>,
        /// Listen on your personal inbox instead of a new session
        #[arg(long)]
        inbox: bool,
    },
    /// Upload files to a session or a user's inbox
    Send {
        /// Session id, receiver id or upload link
        target: String,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Send to a user's inbox instead of a session
        #[arg(long)]
        to_user: bool,
    },
    /// List, delete or download your files
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
    /// Sign in (anonymously) and store the token
    Login,
    /// Forget the stored token
    Logout,
    /// Show current login status
    Whoami,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum FilesAction {
    /// Show files you sent and received
    List,
    /// Delete files; your own uploads are removed, received ones are hidden
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Download files into a directory
    Download {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Target directory
        #[arg(short = 'o', long, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (server, token, max_size_mb, max_files, accept)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Show all configuration
    Show,
    /// Get the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => handle_config_command(action),
        Commands::Logout => {
            let mut config = Config::load().unwrap_or_default();
            auth::logout(&mut config)
        }
        Commands::Whoami => {
            let config = Config::load().unwrap_or_default();
            let server = config.server_url(cli.server.as_deref());
            let backend = HttpBackend::new(&server, cli.token.or(config.remote.token))?;
            auth::whoami(&backend, &server).await
        }
        Commands::Login => {
            let (_, _, store) = connect(cli.server, cli.token).await?;
            if let Some(user) = store.user() {
                println!("\x1b[1;32m✅ Signed in\x1b[0m");
                println!("\x1b[90mUser ID: {}\x1b[0m", user.id);
            }
            Ok(())
        }
        Commands::Receive { origin, inbox } => {
            let (config, backend, mut store) = connect(cli.server.clone(), cli.token).await?;
            let origin = origin.unwrap_or_else(|| config.server_url(cli.server.as_deref()));
            mode::receive::run(&backend, &mut store, &origin, inbox).await
        }
        Commands::Send {
            target,
            files,
            to_user,
        } => {
            let (config, backend, store) = connect(cli.server, cli.token).await?;
            let args = mode::send::SendArgs {
                target,
                files,
                to_user,
            };
            mode::send::run(&backend, store.user(), config.upload.options(true), args).await?;
            Ok(())
        }
        Commands::Files { action } => {
            let (_, backend, mut store) = connect(cli.server, cli.token).await?;
            match action {
                FilesAction::List => mode::files::list(&backend, &mut store).await,
                FilesAction::Delete { ids } => {
                    mode::files::delete(&backend, &mut store, &ids).await?;
                    Ok(())
                }
                FilesAction::Download { ids, output } => {
                    mode::files::download(&backend, &mut store, &ids, &output).await
                }
            }
        }
    }
}

/// Build the backend client and make sure a user is signed in, saving a
/// freshly issued token.
async fn connect(server: Option<String>, token: Option<String>) -> Result<(Config, HttpBackend, AppStore)> {
    let mut config = Config::load().unwrap_or_default();
    let server = config.server_url(server.as_deref());
    let token = token.or_else(|| config.remote.token.clone());

    tracing::debug!("Connecting to {}", server);
    let backend = HttpBackend::new(&server, token)?;

    let before = config.remote.clone();
    let user = auth::ensure_user(&backend, &mut config.remote).await?;
    if config.remote != before {
        config.save()?;
    }

    let mut store = AppStore::new();
    store.set_user(Some(user));
    Ok((config, backend, store))
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = Config::load().unwrap_or_default();
            config.set(&key, &value)?;
            config.save()?;
            println!("Configuration saved");
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            for key in ["server", "token", "user_id", "max_size_mb", "max_files", "accept"] {
                println!("{}: {}", key, config.get(key)?);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
