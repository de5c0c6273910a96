//! blobfs - command line access to a blobfs storage root
//!
//! Subcommands:
//! - `blobfs store <bucket> <id> <file>` - Link or copy an existing file in
//! - `blobfs put <bucket> <id> <name>` - Store stdin under a filename
//! - `blobfs path <bucket> <id> <name>` - Print the storage path
//! - `blobfs url <bucket> <id> <name>` - Print the public URL
//! - `blobfs escape <name>` - Print the sanitized filename

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use blobfs::config::parse_umask;
use blobfs::{escape, BackendConfig, BackendError, FsBackend, ReaderUpload, StoredObject};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "blobfs")]
#[command(about = "Sharded local-filesystem blob storage")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    /// Log filter when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BackendArgs {
    /// TOML file with a [blobfs] section (otherwise BLOBFS_* env vars)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage root
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Public root for URLs
    #[arg(long, global = true)]
    pub_path: Option<String>,

    /// Octal umask, e.g. 022
    #[arg(long, global = true)]
    umask: Option<String>,

    /// Fail instead of creating a missing storage root
    #[arg(long, global = true)]
    no_auto_create: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an existing file (hard link, or copy across filesystems)
    Store {
        /// Bucket id
        bucket: String,

        /// Object id (UUID)
        id: Uuid,

        /// File to store
        file: PathBuf,

        /// Store under this name instead of the file's basename
        #[arg(short, long)]
        name: Option<String>,

        /// Replace an existing object with the same stored name
        #[arg(long)]
        rewrite: bool,
    },

    /// Store stdin as an upload named <name>
    Put {
        /// Bucket id
        bucket: String,

        /// Object id (UUID)
        id: Uuid,

        /// Filename of the upload
        name: String,

        /// Replace an existing object with the same stored name
        #[arg(long)]
        rewrite: bool,
    },

    /// Print the absolute storage path of an object
    Path {
        bucket: String,
        id: Uuid,
        name: String,
    },

    /// Print the public URL of an object
    Url {
        bucket: String,
        id: Uuid,
        name: String,
    },

    /// Print the sanitized form of a filename
    Escape { name: String },
}

impl BackendArgs {
    fn load(&self) -> Result<BackendConfig> {
        let mut config = match &self.config {
            Some(path) => BackendConfig::from_file(path)?,
            None => BackendConfig::from_env()?,
        };

        if let Some(root) = &self.root {
            config.path = root.clone();
        }
        if let Some(pub_path) = &self.pub_path {
            config.pub_path = pub_path.clone();
        }
        if let Some(umask) = &self.umask {
            config.umask = Some(parse_umask(umask).context("invalid --umask")?);
        }
        if self.no_auto_create {
            config.auto_create_path = false;
        }

        Ok(config)
    }

    fn open(&self) -> Result<FsBackend> {
        let config = self.load()?;
        debug!(?config, "opening backend");
        Ok(FsBackend::new(config)?)
    }

    /// Backend for path and URL lookups; never checks or creates the root.
    fn lookup(&self) -> Result<FsBackend> {
        Ok(FsBackend::for_lookup(self.load()?)?)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<BackendError>() {
                Some(backend_err) => eprintln!("error [{}]: {e:#}", backend_err.kind()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Store {
            bucket,
            id,
            file,
            name,
            rewrite,
        } => {
            let backend = cli.backend.open()?;
            let stored = backend.store_file(&bucket, &id, &file, name.as_deref(), rewrite)?;
            print_stored(&stored)?;
        }
        Commands::Put {
            bucket,
            id,
            name,
            rewrite,
        } => {
            let backend = cli.backend.open()?;
            let mut upload = ReaderUpload::new(name, io::stdin().lock());
            let stored = backend.store_upload(&bucket, &id, &mut upload, rewrite)?;
            print_stored(&stored)?;
        }
        Commands::Path { bucket, id, name } => {
            let backend = cli.backend.lookup()?;
            println!("{}", backend.file_path(&bucket, &id, &name).display());
        }
        Commands::Url { bucket, id, name } => {
            let backend = cli.backend.lookup()?;
            println!("{}", backend.public_url(&bucket, &id, &name));
        }
        Commands::Escape { name } => {
            println!("{}", escape(&name));
        }
    }

    Ok(())
}

fn print_stored(stored: &StoredObject) -> Result<()> {
    let json = serde_json::to_string_pretty(stored).context("failed to serialize result")?;
    println!("{json}");
    Ok(())
}
