use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{normalize_content_type, normalize_object_key, BlobStore};
use crate::auth::AuthSession;
use crate::{Error, Result};

const MEMORY_BASE_URL: &str = "memory://blobs";

/// Stored object bytes plus the content type they were uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Process-local blob store for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<BTreeMap<String, StoredBlob>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, object_key: &str) -> Option<StoredBlob> {
        self.objects.lock().await.get(object_key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        _session: &AuthSession,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        let object_key = normalize_object_key(object_key)?;
        let url = self
            .public_url(&object_key)
            .ok_or_else(|| Error::Storage(format!("No public URL for {object_key}")))?;
        self.objects.lock().await.insert(
            object_key,
            StoredBlob {
                bytes,
                content_type: normalize_content_type(content_type),
            },
        );
        Ok(url)
    }

    fn public_url(&self, object_key: &str) -> Option<String> {
        let key = normalize_object_key(object_key).ok()?;
        Some(format!("{MEMORY_BASE_URL}/{key}"))
    }
}
