//! Lockbox Daemon
//!
//! Per-identity file storage service and its command-line client.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daemon::config::Config;
use daemon::ipc::Client;
use protocol::{Body, CookieDirective, Operation, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Lockbox daemon - per-identity file storage.
#[derive(Parser, Debug)]
#[command(name = "lockboxd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the daemon in the foreground
    Serve,

    /// Establish an identity and print its session token
    Login {
        /// Reuse an existing fingerprint instead of generating one
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// Store a file (reads stdin when FILE is omitted)
    Upload {
        /// Session token from `login`
        #[arg(long, env = "LOCKBOX_TOKEN")]
        token: String,

        /// Name to store the file under
        name: String,

        /// Local file to upload
        file: Option<PathBuf>,
    },

    /// Fetch a file (writes stdout unless --output is given)
    Download {
        /// Session token from `login`
        #[arg(long, env = "LOCKBOX_TOKEN")]
        token: String,

        /// Stored file name
        name: String,

        /// Local file to write
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete a file
    Delete {
        /// Session token from `login`
        #[arg(long, env = "LOCKBOX_TOKEN")]
        token: String,

        /// Stored file name
        name: String,
    },

    /// List stored files
    List {
        /// Session token from `login`
        #[arg(long, env = "LOCKBOX_TOKEN")]
        token: String,
    },

    /// Log out (the daemon only tells the client to forget its token)
    Logout {
        /// Session token from `login`
        #[arg(long, env = "LOCKBOX_TOKEN")]
        token: Option<String>,
    },

    /// Check that the daemon is responding
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    let serving = matches!(cli.command, Commands::Serve);
    let _log_guard = init_tracing(&config, cli.verbose, serving)?;

    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    match cli.command {
        Commands::Serve => serve(config).await,
        command => run_client(&config.server.socket_path, command).await,
    }
}

/// Initialize tracing. The daemon may log to daily-rotated files; client
/// commands always log to stderr so stdout stays clean for file content.
fn init_tracing(config: &Config, verbose: bool, serving: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    match (&config.daemon.log_dir, serving) {
        (Some(log_dir), true) => {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
            let appender = tracing_appender::rolling::daily(log_dir, "lockboxd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Lockbox daemon starting...");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    daemon::service::run(config, shutdown).await
}

async fn run_client(socket_path: &Path, command: Commands) -> Result<()> {
    let mut client = Client::connect(socket_path).await.with_context(|| {
        format!(
            "Failed to connect to daemon at {} (is `lockboxd serve` running?)",
            socket_path.display()
        )
    })?;

    match command {
        Commands::Serve => anyhow::bail!("serve is not a client command"),
        Commands::Login { fingerprint } => {
            let response = client
                .call(Request::anonymous(Operation::Login { fingerprint }))
                .await?;
            let response = check(response)?;
            if let Some(location) = &response.redirect {
                println!("location: {}", location);
            }
            if let Some(CookieDirective::Set(cookie)) = &response.cookie {
                println!("token: {}", cookie.value);
            }
        }
        Commands::Upload { token, name, file } => {
            let body = match file {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin()
                        .read_to_end(&mut buf)
                        .await
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            let response = client
                .call(Request::with_session(token, Operation::Upload { name, body }))
                .await?;
            if let Body::Ack {
                sha256: Some(sha256),
                ..
            } = check(response)?.body
            {
                println!("{}", sha256);
            }
        }
        Commands::Download {
            token,
            name,
            output,
        } => {
            let response = client
                .call(Request::with_session(token, Operation::Download { name }))
                .await?;
            let Body::Content(content) = check(response)?.body else {
                anyhow::bail!("Daemon returned an unexpected body for download");
            };
            match output {
                Some(path) => tokio::fs::write(&path, &content)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&content).await?;
                    stdout.flush().await?;
                }
            }
        }
        Commands::Delete { token, name } => {
            let response = client
                .call(Request::with_session(token, Operation::Delete { name }))
                .await?;
            check(response)?;
        }
        Commands::List { token } => {
            let response = client
                .call(Request::with_session(token, Operation::List))
                .await?;
            if let Body::Names(names) = check(response)?.body {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        Commands::Logout { token } => {
            let request = match token {
                Some(token) => Request::with_session(token, Operation::Logout),
                None => Request::anonymous(Operation::Logout),
            };
            let response = check(client.call(request).await?)?;
            if let Some(cookie) = &response.cookie {
                println!("set-cookie: {}", cookie.to_header_value());
            }
        }
        Commands::Ping => {
            check(client.call(Request::anonymous(Operation::Ping)).await?)?;
            println!("pong");
        }
    }

    Ok(())
}

/// Turn an error response into an `Err`.
fn check(response: Response) -> Result<Response> {
    if response.status.is_success() {
        return Ok(response);
    }
    match &response.body {
        Body::Error { code, error } => anyhow::bail!(
            "{} ({:?}, status {})",
            error,
            code,
            response.status.code()
        ),
        _ => anyhow::bail!("request failed with status {}", response.status.code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{ErrorCode, Status};

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::try_parse_from(["lockboxd", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli =
            Cli::try_parse_from(["lockboxd", "serve", "--verbose", "--config", "/etc/lb.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/lb.toml")));
    }

    #[test]
    fn test_cli_parse_login() {
        let cli = Cli::try_parse_from(["lockboxd", "login", "--fingerprint", "alice"]).unwrap();
        match cli.command {
            Commands::Login { fingerprint } => assert_eq!(fingerprint.as_deref(), Some("alice")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_upload() {
        let cli = Cli::try_parse_from([
            "lockboxd", "upload", "--token", "abc", "notes.txt", "./local.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Upload { token, name, file } => {
                assert_eq!(token, "abc");
                assert_eq!(name, "notes.txt");
                assert_eq!(file, Some(PathBuf::from("./local.txt")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_download_output() {
        let cli = Cli::try_parse_from([
            "lockboxd", "download", "--token", "abc", "notes.txt", "-o", "out.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Download { output, .. } => {
                assert_eq!(output, Some(PathBuf::from("out.txt")))
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_passes_success_and_redirect() {
        assert!(check(Response::ok(Body::Pong)).is_ok());
        assert!(check(Response::redirect("/")).is_ok());
    }

    #[test]
    fn test_check_reports_error() {
        let err = check(Response::error(
            Status::NotFound,
            ErrorCode::NotFound,
            "file not found: a.txt",
        ))
        .unwrap_err()
        .to_string();
        assert!(err.contains("file not found: a.txt"));
        assert!(err.contains("404"));
    }
}
