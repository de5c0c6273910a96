//! What a successful store hands back.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::ObjectKey;

/// A stored object: where it lives and how big it is.
///
/// Nothing here is persisted; it can always be recomputed from the inputs
/// except for `size_bytes`, which is read back after the write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObject {
    /// Object id chosen by the caller.
    pub id: Uuid,

    /// Sharded location relative to the storage root.
    pub key: ObjectKey,

    /// Absolute path on disk.
    pub path: PathBuf,

    /// Size of the stored file in bytes.
    pub size_bytes: u64,

    /// Public URL, when the caller asked for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StoredObject {
    pub fn new(id: Uuid, key: ObjectKey, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            id,
            key,
            path: path.into(),
            size_bytes,
            url: None,
        }
    }

    /// Attach the public URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
