//! Blob storage for post images and profile pictures.

mod firebase;
mod memory;
mod s3;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::models::UserId;
use crate::{Error, Result};

pub use firebase::FirebaseStorageClient;
pub use memory::{MemoryBlobStore, StoredBlob};
pub use s3::{S3Config, S3Storage};

/// Object holding the stock avatar given to profiles without a picture.
pub const DEFAULT_PROFILE_PICTURE_KEY: &str = "defaults/profile-picture.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    PostImage,
    ProfilePicture,
}

impl BlobKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::PostImage => "post-images",
            Self::ProfilePicture => "profile-pictures",
        }
    }
}

/// Object storage backend. Uploads resolve to a publicly readable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        session: &AuthSession,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String>;

    /// URL of an existing object, when the backend can derive one without a request.
    fn public_url(&self, object_key: &str) -> Option<String>;
}

/// Build `{kind}/{uid}/{millis}-{uuid}.{ext}` for a new upload.
pub fn build_blob_key(
    kind: BlobKind,
    user_id: &UserId,
    content_type: Option<&str>,
) -> Result<String> {
    let uid = user_id.as_str().trim();
    if uid.is_empty() || uid.contains('/') {
        return Err(Error::InvalidInput(format!(
            "Cannot build a storage key for user id {uid:?}"
        )));
    }

    let ts = Utc::now().timestamp_millis();
    let id = Uuid::now_v7();
    let ext = extension_for(content_type);
    Ok(format!("{}/{uid}/{ts}-{id}.{ext}", kind.prefix()))
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match normalize_content_type(content_type).as_deref() {
        Some("image/jpeg" | "image/jpg") => "jpg",
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/heic") => "heic",
        _ => "bin",
    }
}

pub(crate) fn normalize_object_key(object_key: &str) -> Result<String> {
    let object_key = object_key.trim().trim_matches('/').to_string();
    if object_key.is_empty() {
        return Err(Error::InvalidInput(
            "Blob object_key cannot be empty".to_string(),
        ));
    }
    Ok(object_key)
}

pub(crate) fn normalize_content_type(content_type: Option<&str>) -> Option<String> {
    content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase)
}

pub(crate) fn storage_error(
    backend: &str,
    operation: &str,
    target: &str,
    error: impl std::fmt::Display,
) -> Error {
    Error::Storage(format!("{backend} {operation} failed for {target}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_blob_key_uses_kind_user_and_extension() {
        let uid = UserId::new("AbC123");
        let key = build_blob_key(BlobKind::PostImage, &uid, Some(" image/JPEG ")).unwrap();
        assert!(key.starts_with("post-images/AbC123/"));
        assert!(key.ends_with(".jpg"));

        let key = build_blob_key(BlobKind::ProfilePicture, &uid, None).unwrap();
        assert!(key.starts_with("profile-pictures/AbC123/"));
        assert!(key.ends_with(".bin"));
    }

    #[test]
    fn build_blob_key_is_unique_within_a_millisecond() {
        let uid = UserId::new("u1");
        let first = build_blob_key(BlobKind::PostImage, &uid, Some("image/png")).unwrap();
        let second = build_blob_key(BlobKind::PostImage, &uid, Some("image/png")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn build_blob_key_rejects_unusable_user_ids() {
        assert!(build_blob_key(BlobKind::PostImage, &UserId::new("  "), None).is_err());
        assert!(build_blob_key(BlobKind::PostImage, &UserId::new("a/b"), None).is_err());
    }

    #[test]
    fn normalize_object_key_rejects_empty() {
        let err = normalize_object_key("  / ").unwrap_err();
        match err {
            Error::InvalidInput(message) => assert!(message.contains("object_key")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn normalize_content_type_ignores_empty_values() {
        assert_eq!(normalize_content_type(None), None);
        assert_eq!(normalize_content_type(Some("   ")), None);
        assert_eq!(
            normalize_content_type(Some(" image/PNG ")),
            Some("image/png".to_string())
        );
    }
}
