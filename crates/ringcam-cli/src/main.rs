//! ringcam - command-line access to Ring doorbells, chimes and cameras.
//!
//! Logs in once, caches the session, and lists devices or issues raw API
//! queries through the same re-authenticating client the library exposes.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ringcam_core::{
    AuthCallback, CacheStore, ClientConfig, CredentialStore, Credentials, Device, DeviceKind,
    Method, QueryOptions, QueryOutcome, RingClient, RingDevice,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ringcam", version, about = "Ring doorbell and camera client")]
struct Cli {
    /// Account email (falls back to the last used account)
    #[arg(short, long, env = "RING_USERNAME", global = true)]
    username: Option<String>,

    /// Session cache file
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// Always authenticate from scratch instead of reusing the cached session
    #[arg(long, global = true)]
    no_reuse_session: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate and cache the session
    Login {
        /// Remember the password in the OS keychain
        #[arg(long)]
        save_password: bool,

        /// Register a push-notification token after authenticating
        #[arg(long)]
        persist_token: bool,

        /// Callback URL used as the push-notification token
        #[arg(long)]
        push_url: Option<String>,
    },
    /// Remove the cached session
    Logout {
        /// Also delete the password from the OS keychain
        #[arg(long)]
        forget_password: bool,
    },
    /// List devices on the account
    Devices {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        /// Print the raw device attributes as JSON
        #[arg(long)]
        json: bool,
    },
    /// Issue an authenticated API request
    Query {
        /// Endpoint path (e.g. /clients_api/ring_devices) or full URL
        endpoint: String,

        #[arg(long, value_enum, default_value_t = MethodArg::Get)]
        method: MethodArg,

        /// Extra query parameter, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// JSON body (POST only)
        #[arg(long)]
        body: Option<String>,

        #[arg(long)]
        attempts: Option<u32>,

        /// Print status and body without decoding
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Doorbell,
    Chime,
    StickupCam,
}

impl From<KindArg> for DeviceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Doorbell => DeviceKind::Doorbell,
            KindArg::Chime => DeviceKind::Chime,
            KindArg::StickupCam => DeviceKind::StickupCam,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Get,
    Put,
    Post,
}

impl From<MethodArg> for Method {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => Method::Get,
            MethodArg::Put => Method::Put,
            MethodArg::Post => Method::Post,
        }
    }
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;
    info!("ringcam starting");

    let mut config = match ClientConfig::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            ClientConfig::default()
        }
    };
    if let Some(ref path) = cli.cache_file {
        config.cache_file = Some(path.clone());
    }
    if cli.no_reuse_session {
        config.reuse_session = false;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }

    let username = cli.username.clone().or_else(|| config.last_username.clone());

    match cli.command {
        Command::Login {
            save_password,
            persist_token,
            push_url,
        } => {
            if persist_token {
                config = config.with_persist_token(true, push_url);
            }
            login(config, username, save_password).await
        }
        Command::Logout { forget_password } => logout(&config, username, forget_password),
        Command::Devices { kind, json } => {
            let client = connect(config, username).await?;
            list_devices(&client, kind.map(DeviceKind::from), json).await
        }
        Command::Query {
            endpoint,
            method,
            params,
            body,
            attempts,
            raw,
        } => {
            let client = connect(config, username).await?;
            let mut options = QueryOptions {
                method: method.into(),
                attempts,
                raw,
                ..QueryOptions::default()
            };
            options.extra_params.extend(params);
            if let Some(body) = body {
                options.json = Some(serde_json::from_str(&body).context("--body is not valid JSON")?);
            }
            run_query(&client, &endpoint, options).await
        }
    }
}

fn resolve_credentials(username: Option<String>) -> Result<Credentials> {
    let username = match username {
        Some(u) => u,
        None => {
            eprint!("Ring account email: ");
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    if username.is_empty() {
        anyhow::bail!("No username given (use --username or RING_USERNAME)");
    }

    if let Ok(password) = std::env::var("RING_PASSWORD") {
        return Ok(Credentials::new(username, password));
    }

    match CredentialStore::load(&username) {
        Ok(credentials) => {
            debug!("Using password from keychain");
            Ok(credentials)
        }
        Err(e) => {
            debug!(error = %e, "No keychain password");
            let password = rpassword::prompt_password("Ring password: ")
                .context("Failed to read password")?;
            Ok(Credentials::new(username, password))
        }
    }
}

fn two_factor_prompt() -> AuthCallback {
    Arc::new(|| rpassword::prompt_password("Two-factor code: "))
}

async fn connect(config: ClientConfig, username: Option<String>) -> Result<RingClient> {
    let credentials = resolve_credentials(username)?;
    let client = RingClient::connect(config, credentials, Some(two_factor_prompt()))
        .await
        .context("Failed to authenticate with Ring")?;
    Ok(client)
}

async fn login(config: ClientConfig, username: Option<String>, save_password: bool) -> Result<()> {
    let credentials = resolve_credentials(username)?;
    let client = RingClient::connect(config.clone(), credentials.clone(), Some(two_factor_prompt()))
        .await
        .context("Failed to authenticate with Ring")?;

    if save_password {
        CredentialStore::store(&credentials)?;
        eprintln!("Password saved to keychain");
    }

    let mut config = config;
    config.last_username = Some(client.username().to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    match client.cache_store() {
        Some(cache) => eprintln!("Logged in as {} (session cached at {})", client.username(), cache.path().display()),
        None => eprintln!("Logged in as {}", client.username()),
    }
    Ok(())
}

fn logout(config: &ClientConfig, username: Option<String>, forget_password: bool) -> Result<()> {
    let cache = CacheStore::new(config.cache_path()?);
    cache.clear().context("Failed to remove session cache")?;
    eprintln!("Session cache removed");

    if forget_password {
        let username =
            username.ok_or_else(|| anyhow::anyhow!("--forget-password needs a username"))?;
        CredentialStore::delete(&username)?;
        eprintln!("Password removed from keychain");
    }
    Ok(())
}

fn print_device(device: &Device) {
    let id = device
        .id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let shared = if device.is_shared() { " (shared)" } else { "" };
    println!("{:<12} {:>12}  {}{}", device.kind(), id, device.name(), shared);
}

async fn list_devices(client: &RingClient, kind: Option<DeviceKind>, json: bool) -> Result<()> {
    let devices: Vec<Device> = match kind {
        Some(kind) => client.devices_of(kind).await?,
        None => {
            let all = client.devices().await?;
            all.iter().cloned().collect()
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        eprintln!("No devices found");
        return Ok(());
    }
    for device in &devices {
        print_device(device);
    }
    Ok(())
}

async fn run_query(client: &RingClient, endpoint: &str, options: QueryOptions) -> Result<()> {
    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        client.api_url(endpoint)
    };

    match client.query(&url, options).await? {
        Some(QueryOutcome::Json(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
        Some(QueryOutcome::Raw(response)) => {
            println!("{}", response.status());
            println!("{}", response.text().await?);
        }
        Some(QueryOutcome::NoContent) => eprintln!("OK"),
        None => anyhow::bail!("Query failed: {}", url),
    }
    Ok(())
}
