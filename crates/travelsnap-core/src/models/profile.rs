//! User profile model

use serde::{Deserialize, Serialize};

use super::{PostId, UserId};

/// Per-user record of identity and social state, stored at `users/{uid}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Display name
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "profilePicture", default)]
    pub profile_picture: String,
    /// Ids of posts authored by this user
    #[serde(default)]
    pub posts: Vec<PostId>,
    /// Ids of posts this user has liked
    #[serde(rename = "likedPosts", default)]
    pub liked_posts: Vec<PostId>,
}

impl UserProfile {
    /// A freshly provisioned profile with no posts or likes
    #[must_use]
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        email: Option<String>,
        profile_picture: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            email,
            profile_picture: profile_picture.into(),
            posts: Vec::new(),
            liked_posts: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_liked(&self, post_id: &PostId) -> bool {
        self.liked_posts.contains(post_id)
    }

    /// Capture the author fields copied onto posts and comments
    #[must_use]
    pub fn author_snapshot(&self) -> AuthorSnapshot {
        AuthorSnapshot {
            posted_by: self.user_id.clone(),
            username: self.username.clone(),
            profile_picture: Some(self.profile_picture.clone()).filter(|url| !url.is_empty()),
        }
    }
}

/// Author fields denormalized onto posts and comments.
///
/// Copied from the author's profile when the post or comment is written and
/// never refreshed afterwards: a later rename or picture change on
/// `users/{posted_by}` is not reflected here. Read the profile when current
/// values matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    #[serde(rename = "postedBy")]
    pub posted_by: UserId,
    pub username: String,
    #[serde(
        rename = "profilePicture",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_picture: Option<String>,
}
