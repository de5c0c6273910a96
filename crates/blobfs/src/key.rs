//! ObjectKey: the sharded relative location of a stored object.
//!
//! Layout, relative to a storage or public root:
//! ```text
//! <bucket id>/<shard1>/<shard2>/<object id hex>_<sanitized name>
//! ```
//!
//! The shard code is the base32 encoding of the MD5 digest of the object id's
//! raw bytes. MD5 is only used to spread ids evenly across directories; sequential
//! ids land in unrelated shards.

use std::fmt;
use std::path::{Path, PathBuf};

use data_encoding::BASE32;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::name::{bounded_name, FILENAME_LIMIT};

/// Anything that can name a bucket.
///
/// The identifier must be stable: it becomes the top-level directory of every
/// object stored in the bucket.
pub trait Bucket {
    fn bucket_id(&self) -> String;
}

impl Bucket for str {
    fn bucket_id(&self) -> String {
        self.to_string()
    }
}

impl Bucket for String {
    fn bucket_id(&self) -> String {
        self.clone()
    }
}

impl Bucket for u64 {
    fn bucket_id(&self) -> String {
        self.to_string()
    }
}

impl Bucket for Uuid {
    fn bucket_id(&self) -> String {
        self.to_string()
    }
}

impl<B: Bucket + ?Sized> Bucket for &B {
    fn bucket_id(&self) -> String {
        (**self).bucket_id()
    }
}

/// Compute the base32 shard code for an object id.
pub fn shard_code(id: &Uuid) -> String {
    let digest = Md5::digest(id.as_bytes());
    BASE32.encode(&digest)
}

/// Relative location of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    bucket: String,
    shard1: String,
    shard2: String,
    file_name: String,
}

impl ObjectKey {
    /// Derive the key for an already sanitized filename.
    pub fn derive(bucket_id: impl Into<String>, id: &Uuid, sanitized: &str) -> Self {
        let code = shard_code(id);
        let prefix = format!("{}_", hex::encode(id.as_bytes()));

        Self {
            bucket: bucket_id.into(),
            shard1: code[0..2].to_string(),
            shard2: code[2..4].to_string(),
            file_name: bounded_name(&prefix, sanitized, FILENAME_LIMIT),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The two shard directory names.
    pub fn shards(&self) -> (&str, &str) {
        (&self.shard1, &self.shard2)
    }

    /// Stored filename, `<object id hex>_<name>`, at most [`FILENAME_LIMIT`] chars.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Path segments in order. An empty bucket id contributes no segment.
    fn segments(&self) -> impl Iterator<Item = &str> {
        [&self.bucket, &self.shard1, &self.shard2, &self.file_name]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Relative filesystem path.
    pub fn to_path(&self) -> PathBuf {
        self.segments().collect()
    }

    /// Absolute filesystem path under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(self.to_path())
    }

    /// URL (or URL path) under a public root, always `/`-separated.
    pub fn url_under(&self, pub_root: &str) -> String {
        if pub_root.is_empty() {
            self.to_string()
        } else if pub_root.ends_with('/') {
            format!("{pub_root}{self}")
        } else {
            format!("{pub_root}/{self}")
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}
