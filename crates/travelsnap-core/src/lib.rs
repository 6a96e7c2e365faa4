//! travelsnap-core - Core library for TravelSnap
//!
//! This crate contains the shared models, backend adapters (identity, document
//! store, blob storage), the services composed on top of them, and the route
//! guard used by TravelSnap clients.

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod services;
pub mod storage;
pub mod store;
pub mod util;

pub use auth::{AuthError, AuthSession, AuthUser};
pub use error::{Error, Result};
pub use models::{AuthorSnapshot, Comment, CommentId, GeoPoint, Post, PostId, UserId, UserProfile};
