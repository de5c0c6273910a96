//! Sharded blob storage on a local filesystem.
//!
//! Objects are addressed by a bucket, a caller-chosen UUID, and a filename. The
//! on-disk location is a pure function of those three, so lookups never touch
//! the filesystem and nothing needs an index.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use blobfs::{BackendConfig, FsBackend, ReaderUpload};
//! use uuid::Uuid;
//!
//! // Create from environment (reads BLOBFS_PATH, BLOBFS_UMASK, ...)
//! let config = BackendConfig::from_env().unwrap();
//! let backend = FsBackend::new(config).unwrap();
//!
//! // Or at a specific path
//! let backend = FsBackend::at_path("/srv/blobfs").unwrap();
//!
//! // Store a stream
//! let id = Uuid::new_v4();
//! let mut upload = ReaderUpload::new("report.pdf", std::io::stdin());
//! let stored = backend.store_upload("42", &id, &mut upload, false).unwrap();
//! println!("Stored at: {}", stored.path.display());
//!
//! // Store an existing file (hard link, or copy across filesystems)
//! let stored = backend
//!     .store_file("42", &Uuid::new_v4(), "/tmp/export.csv".as_ref(), None, false)
//!     .unwrap();
//!
//! // Resolve without touching disk
//! let path = backend.file_path("42", &id, "report.pdf");
//! let url = backend.public_url("42", &id, "report.pdf");
//! ```
//!
//! # Layout
//!
//! ```text
//! <root>/<bucket id>/<shard1>/<shard2>/<object id hex>_<sanitized name>
//! ```
//!
//! The shard pair comes from the base32-encoded MD5 of the object id bytes.
//! Names are limited to `[A-Za-z0-9_.-]` and to 75 characters including the id
//! prefix. Directories are created `0o777 & !umask`, files `0o666 & !umask`.
//!
//! # Configuration
//!
//! Environment variables:
//! - `BLOBFS_PATH`: Storage root (default: `~/.blobfs/storage`)
//! - `BLOBFS_PUB_PATH`: Public root for URLs (default: `/storage`)
//! - `BLOBFS_AUTO_CREATE`: Set to "false" to require an existing root
//! - `BLOBFS_UMASK`: Octal umask (default: `022`)

pub mod collision;
pub mod config;
pub mod error;
pub mod key;
pub mod name;
pub mod object;
pub mod provision;
pub mod store;
pub mod upload;

// Re-exports for convenience
pub use collision::Action;
pub use config::{BackendConfig, DEFAULT_UMASK};
pub use error::{BackendError, ErrorKind, Result};
pub use key::{Bucket, ObjectKey};
pub use name::{bounded_name, escape, FILENAME_LIMIT};
pub use object::StoredObject;
pub use store::{BlobBackend, FsBackend};
pub use upload::{PathUpload, ReaderUpload, Upload};
