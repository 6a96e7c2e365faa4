//! Post images and profile pictures on top of a [`BlobStore`].

use std::sync::Arc;

use crate::auth::AuthSession;
use crate::models::UserId;
use crate::storage::{build_blob_key, BlobKind, BlobStore, DEFAULT_PROFILE_PICTURE_KEY};
use crate::{Error, Result};

#[derive(Clone)]
pub struct MediaService {
    blobs: Arc<dyn BlobStore>,
    default_profile_picture_url: Option<String>,
}

impl MediaService {
    pub const fn new(blobs: Arc<dyn BlobStore>, default_profile_picture_url: Option<String>) -> Self {
        Self {
            blobs,
            default_profile_picture_url,
        }
    }

    /// Upload a post image and return its public URL.
    pub async fn upload_post_image(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        self.upload(session, BlobKind::PostImage, user_id, bytes, content_type)
            .await
    }

    /// Upload a profile picture and return its public URL.
    ///
    /// The profile document is not touched; pair with
    /// `SocialService::update_profile_picture`.
    pub async fn upload_profile_picture(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        self.upload(session, BlobKind::ProfilePicture, user_id, bytes, content_type)
            .await
    }

    /// Picture given to profiles whose identity carries none.
    pub fn default_profile_picture_url(&self) -> Option<String> {
        self.default_profile_picture_url
            .clone()
            .or_else(|| self.blobs.public_url(DEFAULT_PROFILE_PICTURE_KEY))
    }

    async fn upload(
        &self,
        session: &AuthSession,
        kind: BlobKind,
        user_id: &UserId,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput("Cannot upload an empty image".to_string()));
        }

        let key = build_blob_key(kind, user_id, content_type)?;
        let size = bytes.len();
        let url = self
            .blobs
            .upload(session, &key, bytes, content_type)
            .await
            .inspect_err(|error| tracing::error!("Failed to upload {key}: {error}"))?;
        tracing::debug!("Uploaded {size} bytes to {key}");
        Ok(url)
    }
}
