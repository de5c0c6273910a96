//! FsBackend: sharded blob storage on a local filesystem.
//!
//! Layout:
//! ```text
//! {path}/
//! ├── 42/                       # bucket id
//! │   ├── W6/                   # base32(md5(object id))[0..2]
//! │   │   └── XX/               # base32(md5(object id))[2..4]
//! │   │       └── 12345678123456781234567812345678_report.pdf
//! │   └── JL/
//! │       └── TR/
//! │           └── 00000000000000000000000000000000_notes.txt
//! └── media/
//!     └── ...
//! ```
//!
//! Every write lands in a hidden temporary file next to its destination, gets its
//! final permissions, and is then renamed into place. A destination is therefore
//! either absent, the previous complete file, or the new complete file.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collision;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use crate::key::{Bucket, ObjectKey};
use crate::name::escape;
use crate::object::StoredObject;
use crate::provision::{ensure_parents, ensure_root, file_mode};
use crate::upload::Upload;

const TEMP_PREFIX: &str = ".blobfs-";

/// Trait for blob storage backends.
///
/// Object safe, so callers can hold a `Box<dyn BlobBackend>` and swap in other
/// implementations.
pub trait BlobBackend: Send + Sync {
    /// Store a streamed upload under its own filename.
    fn store_upload(
        &self,
        bucket: &dyn Bucket,
        id: &Uuid,
        upload: &mut dyn Upload,
        allow_rewrite: bool,
    ) -> Result<StoredObject>;

    /// Store an existing file, linking it when possible.
    ///
    /// `name` overrides the source's basename as the logical filename.
    fn store_file(
        &self,
        bucket: &dyn Bucket,
        id: &Uuid,
        source: &Path,
        name: Option<&str>,
        allow_rewrite: bool,
    ) -> Result<StoredObject>;

    /// Absolute storage path for an object. Does not touch the filesystem.
    fn file_path(&self, bucket: &dyn Bucket, id: &Uuid, filename: &str) -> PathBuf;

    /// Public URL for an object. Does not touch the filesystem.
    fn public_url(&self, bucket: &dyn Bucket, id: &Uuid, filename: &str) -> String;
}

/// Filesystem-based blob backend.
#[derive(Debug, Clone)]
pub struct FsBackend {
    config: BackendConfig,
    umask: u32,
}

impl FsBackend {
    /// Create a backend with the given configuration.
    ///
    /// A relative storage root is resolved against the current directory. The
    /// root is created when missing if `auto_create_path` is set; otherwise a
    /// missing root is [`BackendError::RootUnavailable`].
    pub fn new(config: BackendConfig) -> Result<Self> {
        let backend = Self::for_lookup(config)?;
        ensure_root(
            &backend.config.path,
            backend.config.auto_create_path,
            backend.umask,
        )?;
        Ok(backend)
    }

    /// Create a backend for `file_path` and `public_url` only.
    ///
    /// The root is resolved but neither checked nor created. Storing through
    /// such a backend creates any missing directories, root included.
    pub fn for_lookup(mut config: BackendConfig) -> Result<Self> {
        if config.path.is_relative() {
            let cwd = std::env::current_dir()
                .map_err(|e| BackendError::io("failed to resolve", &config.path, e))?;
            config.path = cwd.join(&config.path);
        }

        let umask = config.effective_umask();
        Ok(Self { config, umask })
    }

    /// Create a backend rooted at a specific path with default settings.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(BackendConfig::with_path(path))
    }

    /// Get the configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Absolute storage root.
    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Umask applied to everything this backend creates.
    pub fn umask(&self) -> u32 {
        self.umask
    }

    /// Derive the key for a raw (unsanitized) filename.
    pub fn key<B: Bucket + ?Sized>(&self, bucket: &B, id: &Uuid, filename: &str) -> ObjectKey {
        ObjectKey::derive(bucket.bucket_id(), id, &escape(filename))
    }

    pub fn file_path<B: Bucket + ?Sized>(&self, bucket: &B, id: &Uuid, filename: &str) -> PathBuf {
        self.key(bucket, id, filename).under(&self.config.path)
    }

    pub fn public_url<B: Bucket + ?Sized>(&self, bucket: &B, id: &Uuid, filename: &str) -> String {
        self.key(bucket, id, filename).url_under(&self.config.pub_path)
    }

    /// Store a streamed upload.
    ///
    /// Fails with [`BackendError::UnsupportedSource`] when the upload carries no
    /// filename, and with [`BackendError::NameCollision`] when the destination
    /// exists and `allow_rewrite` is false.
    pub fn store_upload<B, U>(
        &self,
        bucket: &B,
        id: &Uuid,
        upload: &mut U,
        allow_rewrite: bool,
    ) -> Result<StoredObject>
    where
        B: Bucket + ?Sized,
        U: Upload + ?Sized,
    {
        let filename = upload
            .filename()
            .ok_or_else(|| {
                BackendError::UnsupportedSource("upload does not carry a filename".to_string())
            })?
            .to_string();

        let (key, dest) = self.prepare(bucket, id, &filename, allow_rewrite)?;
        let dir = shard_dir(&dest)?;

        let temp = Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| BackendError::io("failed to create temporary file in", dir, e))?
            .into_temp_path();

        upload
            .save_to(&temp)
            .map_err(|e| BackendError::io("failed to save upload to", &dest, e))?;

        self.finish(id, key, temp, dest, allow_rewrite)
    }

    /// Store an existing regular file.
    ///
    /// The file is hard-linked into place when source and root share a
    /// filesystem and copied otherwise. A symbolic link source stores the file it
    /// points to, under the link's own name. A linked file shares its inode with the
    /// source, so the source's mode changes along with it.
    pub fn store_file<B: Bucket + ?Sized>(
        &self,
        bucket: &B,
        id: &Uuid,
        source: &Path,
        name: Option<&str>,
        allow_rewrite: bool,
    ) -> Result<StoredObject> {
        self.store_file_with(bucket, id, source, name, allow_rewrite, |src, dst| {
            fs::hard_link(src, dst)
        })
    }

    fn store_file_with<B, L>(
        &self,
        bucket: &B,
        id: &Uuid,
        source: &Path,
        name: Option<&str>,
        allow_rewrite: bool,
        link: L,
    ) -> Result<StoredObject>
    where
        B: Bucket + ?Sized,
        L: Fn(&Path, &Path) -> io::Result<()>,
    {
        if !source.is_file() {
            return Err(BackendError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        // link(2) does not follow symbolic links, so link the file they point at.
        let resolved = fs::canonicalize(source)
            .map_err(|e| BackendError::io("failed to resolve", source, e))?;

        let (key, dest) = self.prepare(bucket, id, &name, allow_rewrite)?;
        let temp = link_or_copy(&resolved, shard_dir(&dest)?, link)?;

        self.finish(id, key, temp, dest, allow_rewrite)
    }

    /// Derive the destination, reject early collisions, and create shard dirs.
    fn prepare<B: Bucket + ?Sized>(
        &self,
        bucket: &B,
        id: &Uuid,
        filename: &str,
        allow_rewrite: bool,
    ) -> Result<(ObjectKey, PathBuf)> {
        let key = self.key(bucket, id, filename);
        let dest = key.under(&self.config.path);

        collision::enforce(&dest, allow_rewrite)?;
        ensure_parents(&dest, self.umask)?;

        Ok((key, dest))
    }

    /// Apply final permissions to the written temporary file and move it into place.
    fn finish(
        &self,
        id: &Uuid,
        key: ObjectKey,
        temp: TempPath,
        dest: PathBuf,
        allow_rewrite: bool,
    ) -> Result<StoredObject> {
        fs::set_permissions(&temp, Permissions::from_mode(file_mode(self.umask)))
            .map_err(|e| BackendError::io("failed to set permissions on", &dest, e))?;

        let size_bytes = fs::metadata(&temp)
            .map_err(|e| BackendError::io("failed to stat", &dest, e))?
            .len();

        collision::commit(temp, &dest, allow_rewrite)?;

        debug!(
            bucket = %key.bucket(),
            id = %id,
            path = %dest.display(),
            bytes = size_bytes,
            "stored object"
        );

        let url = key.url_under(&self.config.pub_path);
        Ok(StoredObject::new(*id, key, dest, size_bytes).with_url(url))
    }
}

impl BlobBackend for FsBackend {
    fn store_upload(
        &self,
        bucket: &dyn Bucket,
        id: &Uuid,
        upload: &mut dyn Upload,
        allow_rewrite: bool,
    ) -> Result<StoredObject> {
        FsBackend::store_upload(self, bucket, id, upload, allow_rewrite)
    }

    fn store_file(
        &self,
        bucket: &dyn Bucket,
        id: &Uuid,
        source: &Path,
        name: Option<&str>,
        allow_rewrite: bool,
    ) -> Result<StoredObject> {
        FsBackend::store_file(self, bucket, id, source, name, allow_rewrite)
    }

    fn file_path(&self, bucket: &dyn Bucket, id: &Uuid, filename: &str) -> PathBuf {
        FsBackend::file_path(self, bucket, id, filename)
    }

    fn public_url(&self, bucket: &dyn Bucket, id: &Uuid, filename: &str) -> String {
        FsBackend::public_url(self, bucket, id, filename)
    }
}

fn shard_dir(dest: &Path) -> Result<&Path> {
    dest.parent().ok_or_else(|| {
        BackendError::io(
            "no parent directory for",
            dest,
            io::Error::from(io::ErrorKind::InvalidInput),
        )
    })
}

/// Link `source` to a fresh temporary name in `dir`, copying on `EXDEV`.
fn link_or_copy<L>(source: &Path, dir: &Path, link: L) -> Result<TempPath>
where
    L: Fn(&Path, &Path) -> io::Result<()>,
{
    let mut builder = Builder::new();
    builder.prefix(TEMP_PREFIX);

    match builder.make_in(dir, |temp| link(source, temp)) {
        Ok(linked) => Ok(linked.into_temp_path()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            warn!(
                source = %source.display(),
                dir = %dir.display(),
                "source is on another filesystem, copying"
            );

            let temp = builder
                .tempfile_in(dir)
                .map_err(|e| BackendError::io("failed to create temporary file in", dir, e))?
                .into_temp_path();
            fs::copy(source, &temp).map_err(|e| BackendError::io("failed to copy", source, e))?;
            Ok(temp)
        }
        Err(e) => Err(BackendError::io("failed to link", source, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::upload::{PathUpload, ReaderUpload};
    use anyhow::Result;
    use std::io::Cursor;
    use std::os::unix::fs::{symlink, MetadataExt};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn scenario_id() -> Uuid {
        Uuid::parse_str("12345678123456781234567812345678").unwrap()
    }

    fn backend(temp_dir: &TempDir) -> Result<FsBackend> {
        let config = BackendConfig::with_path(temp_dir.path().join("storage"))
            .with_pub_path("https://files.example.com/pub")
            .with_umask(0o022);
        Ok(FsBackend::new(config)?)
    }

    fn upload(name: &str, data: &[u8]) -> ReaderUpload<Cursor<Vec<u8>>> {
        ReaderUpload::new(name, Cursor::new(data.to_vec()))
    }

    fn temp_leftovers(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .count()
    }

    #[test]
    fn test_store_upload_and_read_back() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let stored = store.store_upload("42", &scenario_id(), &mut upload("report.pdf", b"%PDF-1.7"), false)?;

        assert_eq!(stored.path, store.file_path("42", &scenario_id(), "report.pdf"));
        assert_eq!(stored.size_bytes, 8);
        assert_eq!(fs::read(&stored.path)?, b"%PDF-1.7");
        assert_eq!(
            stored.url.as_deref(),
            Some(store.public_url("42", &scenario_id(), "report.pdf").as_str())
        );
        Ok(())
    }

    #[test]
    fn test_scenario_layout() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let path = store.file_path("42", &scenario_id(), "report.pdf");
        let expected = store
            .root()
            .join("42/W6/XX/12345678123456781234567812345678_report.pdf");
        assert_eq!(path, expected);
        Ok(())
    }

    #[test]
    fn test_lookups_are_pure_and_agree() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let path = store.file_path("media", &id, "a b/c.txt");
        let url = store.public_url("media", &id, "a b/c.txt");

        assert!(!path.exists());
        assert!(!store.root().join("media").exists());
        assert_eq!(path, store.file_path("media", &id, "a b/c.txt"));

        let rel = path.strip_prefix(store.root())?.to_string_lossy().into_owned();
        assert_eq!(url, format!("https://files.example.com/pub/{rel}"));
        assert!(rel.ends_with("_a_b_c.txt"));
        Ok(())
    }

    #[test]
    fn test_file_and_dir_modes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = BackendConfig::with_path(temp_dir.path().join("storage")).with_umask(0o027);
        let store = FsBackend::new(config)?;

        let stored = store.store_upload("b", &Uuid::new_v4(), &mut upload("f.bin", b"x"), false)?;

        assert_eq!(fs::metadata(&stored.path)?.mode() & 0o777, 0o640);
        let shard2 = stored.path.parent().unwrap();
        let shard1 = shard2.parent().unwrap();
        let bucket = shard1.parent().unwrap();
        for dir in [shard2, shard1, bucket, store.root()] {
            assert_eq!(fs::metadata(dir)?.mode() & 0o777, 0o750, "{}", dir.display());
        }
        Ok(())
    }

    #[test]
    fn test_default_umask_applies() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsBackend::at_path(temp_dir.path().join("storage"))?;
        assert_eq!(store.umask(), crate::config::DEFAULT_UMASK);

        let stored = store.store_upload("b", &Uuid::new_v4(), &mut upload("f", b"x"), false)?;
        assert_eq!(fs::metadata(&stored.path)?.mode() & 0o777, 0o644);
        Ok(())
    }

    #[test]
    fn test_anonymous_upload_is_unsupported() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let mut anon = ReaderUpload::anonymous(Cursor::new(b"bytes".to_vec()));
        let err = store.store_upload("b", &Uuid::new_v4(), &mut anon, false).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsupportedSource);
        assert!(!anon.is_consumed());
        Ok(())
    }

    #[test]
    fn test_collision_rejects_and_keeps_content() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let first = store.store_upload("b", &id, &mut upload("same.txt", b"first"), false)?;

        let mut second = upload("same.txt", b"second");
        let err = store.store_upload("b", &id, &mut second, false).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NameCollision);
        assert!(!second.is_consumed());
        assert_eq!(fs::read(&first.path)?, b"first");
        Ok(())
    }

    #[test]
    fn test_sanitized_names_collide() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        store.store_upload("b", &id, &mut upload("a b.txt", b"1"), false)?;
        let err = store
            .store_upload("b", &id, &mut upload("a/b.txt", b"2"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameCollision);
        Ok(())
    }

    #[test]
    fn test_rewrite_replaces_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        store.store_upload("b", &id, &mut upload("same.txt", b"first version"), false)?;
        let stored = store.store_upload("b", &id, &mut upload("same.txt", b"second"), true)?;

        assert_eq!(fs::read(&stored.path)?, b"second");
        assert_eq!(stored.size_bytes, 6);
        assert_eq!(temp_leftovers(stored.path.parent().unwrap()), 0);
        Ok(())
    }

    #[test]
    fn test_rewrite_replaces_symlink() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let outside = temp_dir.path().join("outside.txt");
        fs::write(&outside, b"outside")?;

        let dest = store.file_path("b", &id, "linked.txt");
        fs::create_dir_all(dest.parent().unwrap())?;
        symlink(&outside, &dest)?;

        let err = store
            .store_upload("b", &id, &mut upload("linked.txt", b"new"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameCollision);

        store.store_upload("b", &id, &mut upload("linked.txt", b"new"), true)?;

        assert!(fs::symlink_metadata(&dest)?.file_type().is_file());
        assert_eq!(fs::read(&dest)?, b"new");
        assert_eq!(fs::read(&outside)?, b"outside");
        Ok(())
    }

    #[test]
    fn test_store_path_upload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let spool = temp_dir.path().join("multipart-0001");
        fs::write(&spool, b"spooled")?;

        let stored = store.store_upload("b", &Uuid::new_v4(), &mut PathUpload::new("up.dat", &spool), false)?;
        assert_eq!(fs::read(&stored.path)?, b"spooled");
        assert!(!spool.exists());
        Ok(())
    }

    #[test]
    fn test_store_file_links() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let source = temp_dir.path().join("source.csv");
        fs::write(&source, b"a,b\n1,2\n")?;

        let stored = store.store_file("b", &Uuid::new_v4(), &source, None, false)?;

        assert!(stored.path.to_string_lossy().ends_with("_source.csv"));
        assert_eq!(fs::read(&stored.path)?, b"a,b\n1,2\n");
        assert_eq!(fs::metadata(&stored.path)?.ino(), fs::metadata(&source)?.ino());
        assert_eq!(fs::metadata(&stored.path)?.mode() & 0o777, 0o644);
        Ok(())
    }

    #[test]
    fn test_store_file_over_itself_with_rewrite() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let source = temp_dir.path().join("loop.txt");
        fs::write(&source, b"same inode")?;

        let first = store.store_file("b", &id, &source, None, false)?;
        let second = store.store_file("b", &id, &first.path, Some("loop.txt"), true)?;

        assert_eq!(first.path, second.path);
        assert_eq!(fs::read(&second.path)?, b"same inode");
        assert_eq!(temp_leftovers(second.path.parent().unwrap()), 0);
        Ok(())
    }

    #[test]
    fn test_store_file_through_absolute_symlink() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let target = temp_dir.path().join("target.txt");
        fs::write(&target, b"linked content")?;
        let link = temp_dir.path().join("alias.txt");
        symlink(&target, &link)?;

        let stored = store.store_file("b", &id, &link, None, false)?;

        assert_eq!(stored.path, store.file_path("b", &id, "alias.txt"));
        assert!(fs::symlink_metadata(&stored.path)?.file_type().is_file());
        assert_eq!(fs::metadata(&stored.path)?.ino(), fs::metadata(&target)?.ino());
        assert_eq!(fs::read(&stored.path)?, b"linked content");
        assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
        Ok(())
    }

    #[test]
    fn test_store_file_through_relative_symlink() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let src_dir = temp_dir.path().join("incoming");
        fs::create_dir(&src_dir)?;
        fs::write(src_dir.join("target.txt"), b"relative")?;
        let link = src_dir.join("link.txt");
        symlink("target.txt", &link)?;

        let stored = store.store_file("b", &id, &link, None, false)?;

        assert!(stored.path.to_string_lossy().ends_with("_link.txt"));
        assert!(fs::symlink_metadata(&stored.path)?.file_type().is_file());
        assert_eq!(fs::read(&stored.path)?, b"relative");
        assert_eq!(stored.size_bytes, 8);
        Ok(())
    }

    #[test]
    fn test_store_file_name_override() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let source = temp_dir.path().join("tmp123");
        fs::write(&source, b"data")?;

        let stored = store.store_file("b", &id, &source, Some("Quarterly Report.xlsx"), false)?;
        assert_eq!(stored.path, store.file_path("b", &id, "Quarterly Report.xlsx"));
        assert!(stored.path.to_string_lossy().ends_with("_Quarterly_Report.xlsx"));
        Ok(())
    }

    #[test]
    fn test_store_file_missing_source() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let err = store
            .store_file("b", &Uuid::new_v4(), &temp_dir.path().join("nope"), None, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);

        let err = store
            .store_file("b", &Uuid::new_v4(), temp_dir.path(), None, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
        Ok(())
    }

    #[test]
    fn test_cross_device_falls_back_to_copy() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;

        let source = temp_dir.path().join("big.iso");
        fs::write(&source, b"original bytes")?;

        let stored = store.store_file_with("b", &Uuid::new_v4(), &source, None, false, |_, _| {
            Err(io::Error::from_raw_os_error(libc::EXDEV))
        })?;

        assert_eq!(fs::read(&stored.path)?, b"original bytes");
        assert_ne!(fs::metadata(&stored.path)?.ino(), fs::metadata(&source)?.ino());

        fs::write(&source, b"changed later")?;
        assert_eq!(fs::read(&stored.path)?, b"original bytes");
        assert_eq!(temp_leftovers(stored.path.parent().unwrap()), 0);
        Ok(())
    }

    #[test]
    fn test_other_link_errors_propagate() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let source = temp_dir.path().join("src");
        fs::write(&source, b"x")?;

        let err = store
            .store_file_with("b", &id, &source, None, false, |_, _| {
                Err(io::Error::from_raw_os_error(libc::EPERM))
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!store.file_path("b", &id, "src").exists());
        Ok(())
    }

    #[test]
    fn test_failed_upload_leaves_nothing() -> Result<()> {
        struct Broken;

        impl Upload for Broken {
            fn filename(&self) -> Option<&str> {
                Some("broken.bin")
            }

            fn save_to(&mut self, dest: &Path) -> io::Result<u64> {
                fs::write(dest, b"partial")?;
                Err(io::Error::other("connection reset"))
            }
        }

        let temp_dir = TempDir::new()?;
        let store = backend(&temp_dir)?;
        let id = Uuid::new_v4();

        let err = store.store_upload("b", &id, &mut Broken, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let dest = store.file_path("b", &id, "broken.bin");
        assert!(!dest.exists());
        assert_eq!(temp_leftovers(dest.parent().unwrap()), 0);
        Ok(())
    }

    #[test]
    fn test_missing_root_without_auto_create() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = BackendConfig::with_path(temp_dir.path().join("absent")).without_auto_create();

        let err = FsBackend::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RootUnavailable);
        Ok(())
    }

    #[test]
    fn test_lookup_backend_leaves_root_alone() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("absent");
        let config = BackendConfig::with_path(&root)
            .with_pub_path("/files")
            .without_auto_create();

        let store = FsBackend::for_lookup(config)?;

        assert_eq!(
            store.file_path("42", &scenario_id(), "report.pdf"),
            root.join("42/W6/XX/12345678123456781234567812345678_report.pdf")
        );
        assert_eq!(
            store.public_url("42", &scenario_id(), "report.pdf"),
            "/files/42/W6/XX/12345678123456781234567812345678_report.pdf"
        );
        assert!(!root.exists());
        Ok(())
    }

    #[test]
    fn test_concurrent_writes_without_rewrite() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(backend(&temp_dir)?);
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..10)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    let data = format!("writer {n}");
                    store.store_upload("b", &id, &mut upload("race.txt", data.as_bytes()), false)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::NameCollision));

        let content = fs::read_to_string(store.file_path("b", &id, "race.txt"))?;
        assert!(content.starts_with("writer "));
        Ok(())
    }

    #[test]
    fn test_concurrent_writes_with_rewrite() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(backend(&temp_dir)?);
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..10)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    let data = format!("writer {n}");
                    store
                        .store_upload("b", &id, &mut upload("race.txt", data.as_bytes()), true)
                        .expect("write failed")
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let dest = store.file_path("b", &id, "race.txt");
        let content = fs::read_to_string(&dest)?;
        assert!(content.starts_with("writer "));
        assert_eq!(temp_leftovers(dest.parent().unwrap()), 0);
        Ok(())
    }

    #[test]
    fn test_dyn_backend() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store: Box<dyn BlobBackend> = Box::new(backend(&temp_dir)?);
        let bucket = String::from("dyn");
        let id = Uuid::new_v4();

        let mut up = upload("x.txt", b"via trait");
        let stored = store.store_upload(&bucket, &id, &mut up, false)?;

        assert_eq!(stored.path, store.file_path(&bucket, &id, "x.txt"));
        assert!(store.public_url(&bucket, &id, "x.txt").contains("/dyn/"));
        Ok(())
    }
}
