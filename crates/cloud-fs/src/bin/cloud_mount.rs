//! cloud-mount: Mount a remote content tree as a lazily hydrated filesystem.
//!
//! Files show up immediately with placeholder sizes; their content is
//! downloaded on first open and reclaimed again after a period of idleness.
//!
//! # Usage
//!
//! ```bash
//! # Secret from the environment
//! CLOUDFS_SECRET=... cloud-mount student@example.com /mnt/cloud
//!
//! # Secret from stdin, custom cache policy
//! cloud-mount student@example.com /mnt/cloud -n 10 -u 5 --stale-minutes 30 < secret.txt
//! ```

use clap::Parser;
use cloud_fs::{fuse, sweeper, CloudFs, MountConfig, SecretString};
use cloud_remote::{HttpProvider, HttpProviderConfig};
use env_logger::Env;
use log::{error, info, warn};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// Environment variable holding the provider secret.
const SECRET_ENV: &str = "CLOUDFS_SECRET";

/// Mount a remote content tree.
///
/// The tree is listed once at startup and again after every sweep. File
/// content is fetched on first access.
#[derive(Parser, Debug)]
#[command(name = "cloud-mount")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Identity used to log in to the provider
    #[arg(value_name = "IDENTITY")]
    identity: String,

    /// Directory to mount on (created if missing)
    #[arg(value_name = "MOUNT_POINT")]
    mount_point: PathBuf,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URL of the provider API
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Maximum number of files kept hydrated after a sweep (0 = unbounded)
    #[arg(short = 'n', long, value_name = "MAX_FILES")]
    max_files: Option<usize>,

    /// Minutes between cache sweeps
    #[arg(short = 'u', long, value_name = "MINUTES")]
    update_minutes: Option<u64>,

    /// Idle minutes after which a file's content is reclaimed
    #[arg(long, value_name = "MINUTES")]
    stale_minutes: Option<u64>,

    /// Do not re-list the remote tree after each sweep
    #[arg(long)]
    no_refresh: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> cloud_fs::Result<MountConfig> {
        let mut config = match &self.config {
            Some(path) => MountConfig::load(path)?,
            None => MountConfig::default(),
        };

        config.identity = self.identity;
        config.mount_point = self.mount_point;
        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        if let Some(max) = self.max_files {
            config.max_cached_files = max;
        }
        if let Some(minutes) = self.update_minutes {
            config.sweep_interval_secs = minutes.saturating_mul(60);
        }
        if let Some(minutes) = self.stale_minutes {
            config.stale_after_secs = minutes.saturating_mul(60);
        }
        if self.no_refresh {
            config.refresh_on_sweep = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let config = match args.into_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let secret = match read_secret() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to read secret: {}", e);
            process::exit(1);
        }
    };

    let created = match prepare_mount_point(&config.mount_point) {
        Ok(created) => created,
        Err(e) => {
            error!(
                "Cannot use mount point {}: {}",
                config.mount_point.display(),
                e
            );
            process::exit(1);
        }
    };

    let result = run(&config, &secret);

    if created {
        if let Err(e) = fs::remove_dir(&config.mount_point) {
            warn!(
                "Failed to remove mount point {}: {}",
                config.mount_point.display(),
                e
            );
        }
    }

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

/// Connect, mount and serve until Ctrl+C.
///
/// Provider I/O is blocking, so the runtime is built here rather than
/// around `main`; only the sweeper and the signal wait run on it.
fn run(config: &MountConfig, secret: &SecretString) -> cloud_fs::Result<()> {
    let provider = HttpProvider::new(HttpProviderConfig {
        base_url: config.base_url.clone(),
        timeout: config.request_timeout(),
        ..Default::default()
    })?;

    info!("Connecting to {}", config.base_url);
    let cloud = CloudFs::connect(Arc::new(provider), config.clone(), secret)?;
    let stats = cloud.stats();
    info!("Remote tree: {} items", stats.items);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let session = fuse::mount_background(cloud.clone(), &config.mount_point)?;
    info!("Mounted at {}", config.mount_point.display());
    info!("Press Ctrl+C to unmount");

    runtime.block_on(async {
        let sweeper = sweeper::spawn(
            cloud.clone(),
            config.sweep_interval(),
            config.refresh_on_sweep,
        );

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for Ctrl+C: {}", e);
        }
        sweeper.shutdown().await;
    });

    drop(session);
    info!("Unmounted {}", config.mount_point.display());
    Ok(())
}

fn read_secret() -> io::Result<SecretString> {
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        return Ok(SecretString::new(secret));
    }

    eprint!("Secret for the provider: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no secret given (set {} or pipe it on stdin)", SECRET_ENV),
        ));
    }
    Ok(SecretString::new(secret))
}

/// Create the mount point if it does not exist. Returns whether it was
/// created here.
fn prepare_mount_point(path: &Path) -> io::Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "exists and is not a directory",
        ));
    }
    fs::create_dir_all(path)?;
    info!("Created mount point {}", path.display());
    Ok(true)
}
