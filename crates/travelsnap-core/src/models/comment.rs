//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorSnapshot, CommentId, UserId};

/// A reply attached to a post, stored at `posts/{postId}/comments/{commentId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(flatten)]
    pub author: AuthorSnapshot,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Comment {
    #[must_use]
    pub fn is_authored_by(&self, user_id: &UserId) -> bool {
        &self.author.posted_by == user_id
    }
}

/// Fields supplied when submitting a comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub author: AuthorSnapshot,
    pub text: String,
}

#[derive(Serialize)]
pub(crate) struct CommentRecord<'a> {
    pub id: &'a CommentId,
    #[serde(flatten)]
    pub author: &'a AuthorSnapshot,
    pub text: &'a str,
}

impl NewComment {
    pub(crate) fn record<'a>(&'a self, id: &'a CommentId) -> CommentRecord<'a> {
        CommentRecord {
            id,
            author: &self.author,
            text: &self.text,
        }
    }
}
