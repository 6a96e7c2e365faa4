//! Client-facing services composed over the backend adapters.

mod auth;
mod media;
mod social;

use std::sync::Arc;

use crate::auth::{FirebaseAuthClient, IdentityProvider, SessionPersistence};
use crate::config::BackendConfig;
use crate::storage::{BlobStore, FirebaseStorageClient, S3Config, S3Storage};
use crate::store::{DocumentStore, FirestoreClient};
use crate::Result;

pub use auth::{AuthService, SignOut};
pub use media::MediaService;
pub use social::SocialService;

/// The three services wired against one set of backends.
#[derive(Clone)]
pub struct Backend<S: SessionPersistence> {
    pub auth: AuthService<S>,
    pub social: SocialService,
    pub media: MediaService,
}

impl<S: SessionPersistence> Backend<S> {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        store: S,
        default_profile_picture_url: Option<String>,
    ) -> Self {
        let social = SocialService::new(documents);
        let media = MediaService::new(blobs, default_profile_picture_url);
        let auth = AuthService::new(identity, store, social.clone(), media.clone());
        Self {
            auth,
            social,
            media,
        }
    }

    /// Firebase identity and Firestore, with blobs in Firebase Storage unless
    /// an S3-compatible bucket is given.
    pub fn from_config(config: &BackendConfig, s3: Option<S3Config>, store: S) -> Result<Self> {
        let identity = FirebaseAuthClient::from_config(config)?;
        let documents = FirestoreClient::from_config(config)?;
        let blobs: Arc<dyn BlobStore> = match s3 {
            Some(s3) => {
                tracing::debug!("Using S3 bucket {} for blobs", s3.bucket);
                Arc::new(S3Storage::new(s3))
            }
            None => Arc::new(FirebaseStorageClient::from_config(config)?),
        };

        Ok(Self::new(
            Arc::new(identity),
            Arc::new(documents),
            blobs,
            store,
            config.default_profile_picture_url.clone(),
        ))
    }
}
