//! Data models for TravelSnap

mod comment;
mod geo;
mod ids;
mod post;
mod profile;

pub use comment::{Comment, NewComment};
pub use geo::GeoPoint;
pub use ids::{CommentId, PostId, UserId};
pub use post::{NewPost, Post};
pub use profile::{AuthorSnapshot, UserProfile};
