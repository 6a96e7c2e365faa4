//! Profiles, posts, likes and comments on top of a [`DocumentStore`].

use std::sync::Arc;

use serde_json::{json, Value};

use crate::auth::AuthSession;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId, UserId, UserProfile};
use crate::store::{
    to_fields, CollectionPath, Direction, Document, DocumentPath, DocumentStore, FieldTransform,
    Fields, Precondition, Query, Write,
};
use crate::{Error, Result};

const USERS: &str = "users";
const POSTS: &str = "posts";
const COMMENTS: &str = "comments";

const ID_FIELD: &str = "id";
const FIELD_POSTS: &str = "posts";
const FIELD_LIKED_POSTS: &str = "likedPosts";
const FIELD_LIKES_COUNT: &str = "likesCount";
const FIELD_PROFILE_PICTURE: &str = "profilePicture";
const FIELD_POSTED_BY: &str = "postedBy";
const FIELD_CREATED_AT: &str = "createdAt";

/// Document-level operations shared by every client surface.
#[derive(Clone)]
pub struct SocialService {
    store: Arc<dyn DocumentStore>,
}

impl SocialService {
    pub const fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write (or overwrite) a profile document.
    pub async fn create_user_profile(
        &self,
        session: &AuthSession,
        profile: &UserProfile,
    ) -> Result<()> {
        let write = Write::set(user_path(&profile.user_id)?, to_fields(profile)?);
        self.store
            .commit(session, vec![write])
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to create profile {}: {error}", profile.user_id);
            })
    }

    /// Create the profile only when none exists yet.
    ///
    /// Returns `false` when another client already provisioned it.
    pub async fn provision_user_profile(
        &self,
        session: &AuthSession,
        profile: &UserProfile,
    ) -> Result<bool> {
        let write = Write::set(user_path(&profile.user_id)?, to_fields(profile)?)
            .require(Precondition::Exists(false));
        match self.store.commit(session, vec![write]).await {
            Ok(()) => {
                tracing::info!("Provisioned profile {}", profile.user_id);
                Ok(true)
            }
            Err(Error::Conflict(_)) => {
                tracing::debug!("Profile {} already provisioned", profile.user_id);
                Ok(false)
            }
            Err(error) => {
                tracing::error!("Failed to provision profile {}: {error}", profile.user_id);
                Err(error)
            }
        }
    }

    pub async fn get_user_profile(
        &self,
        session: &AuthSession,
        user_id: &UserId,
    ) -> Result<Option<UserProfile>> {
        let document = self
            .store
            .get(session, &user_path(user_id)?)
            .await
            .inspect_err(|error| tracing::error!("Failed to fetch profile {user_id}: {error}"))?;
        document.map(|document| document.decode()).transpose()
    }

    /// Replace only the profile picture field of an existing profile.
    pub async fn update_profile_picture(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        url: &str,
    ) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert(FIELD_PROFILE_PICTURE.to_string(), json!(url));
        let write = Write::merge(user_path(user_id)?, fields).require(Precondition::Exists(true));
        self.store
            .commit(session, vec![write])
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to update profile picture for {user_id}: {error}");
            })
    }

    /// Publish a post and append it to the author's `posts` in one commit.
    pub async fn create_new_post(&self, session: &AuthSession, draft: &NewPost) -> Result<Post> {
        let id = PostId::generate();
        let path = post_path(&id)?;
        let writes = vec![
            Write::set(path.clone(), to_fields(&draft.record(&id))?)
                .with_transform(FIELD_CREATED_AT, FieldTransform::ServerTimestamp)
                .require(Precondition::Exists(false)),
            Write::transform(user_path(&draft.author.posted_by)?)
                .with_transform(FIELD_POSTS, FieldTransform::ArrayUnion(vec![json!(id)]))
                .require(Precondition::Exists(true)),
        ];
        self.store
            .commit(session, writes)
            .await
            .inspect_err(|error| tracing::error!("Failed to create post {id}: {error}"))?;

        tracing::info!("Created post {id} by {}", draft.author.posted_by);
        self.get_post_by_id(session, &id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Post {id} vanished after creation")))
    }

    pub async fn get_post_by_id(
        &self,
        session: &AuthSession,
        post_id: &PostId,
    ) -> Result<Option<Post>> {
        let document = self
            .store
            .get(session, &post_path(post_id)?)
            .await
            .inspect_err(|error| tracing::error!("Failed to fetch post {post_id}: {error}"))?;
        document.as_ref().map(decode_keyed).transpose()
    }

    /// Posts authored by `user_id`, newest first.
    pub async fn get_posts_by_user(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Post>> {
        let mut query = Query::new(CollectionPath::root(POSTS)?)
            .where_eq(FIELD_POSTED_BY, user_id.as_str())
            .order_by(FIELD_CREATED_AT, Direction::Descending);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        self.run_query(session, &query).await
    }

    /// The feed: every post, newest first.
    pub async fn get_all_posts(
        &self,
        session: &AuthSession,
        limit: Option<u32>,
    ) -> Result<Vec<Post>> {
        let mut query = Query::new(CollectionPath::root(POSTS)?)
            .order_by(FIELD_CREATED_AT, Direction::Descending);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        self.run_query(session, &query).await
    }

    /// Append `post_id` to the user's `posts`; repeated calls are no-ops.
    pub async fn add_user_post(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        post_id: &PostId,
    ) -> Result<()> {
        let write = Write::transform(user_path(user_id)?)
            .with_transform(FIELD_POSTS, FieldTransform::ArrayUnion(vec![json!(post_id)]))
            .require(Precondition::Exists(true));
        self.store
            .commit(session, vec![write])
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to add post {post_id} to {user_id}: {error}");
            })
    }

    /// Add or remove `post_id` in the user's `likedPosts` without touching the count.
    pub async fn update_user_liked_post(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        post_id: &PostId,
        liked: bool,
    ) -> Result<()> {
        let write = Write::transform(user_path(user_id)?)
            .with_transform(FIELD_LIKED_POSTS, liked_transform(post_id, liked))
            .require(Precondition::Exists(true));
        self.store
            .commit(session, vec![write])
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to update liked posts of {user_id}: {error}");
            })
    }

    /// Like or unlike a post, keeping `likesCount` in step with `likedPosts`.
    ///
    /// Returns `false` when the user's liked state already matched. The
    /// profile change and the count change land in a single commit guarded by
    /// the profile version that was read, so a concurrent toggle from another
    /// client fails with [`Error::Conflict`] instead of double counting.
    /// An unlike never takes the count below zero: when the post already
    /// shows no likes only the profile entry is removed.
    pub async fn like_post(
        &self,
        session: &AuthSession,
        user_id: &UserId,
        post_id: &PostId,
        liked: bool,
    ) -> Result<bool> {
        let path = user_path(user_id)?;
        let document = self
            .store
            .get(session, &path)
            .await
            .inspect_err(|error| tracing::error!("Failed to fetch profile {user_id}: {error}"))?
            .ok_or_else(|| Error::NotFound(format!("No profile for user {user_id}")))?;
        let profile: UserProfile = document.decode()?;
        if profile.has_liked(post_id) == liked {
            return Ok(false);
        }

        let mut writes = vec![Write::transform(path)
            .with_transform(FIELD_LIKED_POSTS, liked_transform(post_id, liked))
            .require(version_of(&document))];
        if liked {
            writes.push(
                Write::transform(post_path(post_id)?)
                    .with_transform(FIELD_LIKES_COUNT, FieldTransform::Increment(1))
                    .require(Precondition::Exists(true)),
            );
        } else {
            let post_document = self
                .store
                .get(session, &post_path(post_id)?)
                .await
                .inspect_err(|error| tracing::error!("Failed to fetch post {post_id}: {error}"))?
                .ok_or_else(|| Error::NotFound(format!("Post {post_id} not found")))?;
            let post: Post = decode_keyed(&post_document)?;
            if post.likes_count > 0 {
                writes.push(
                    Write::transform(post_document.path.clone())
                        .with_transform(FIELD_LIKES_COUNT, FieldTransform::Increment(-1))
                        .require(version_of(&post_document)),
                );
            } else {
                tracing::warn!("Post {post_id} has no likes to remove; only updating {user_id}");
            }
        }

        self.store
            .commit(session, writes)
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to set like of {post_id} by {user_id}: {error}");
            })?;
        Ok(true)
    }

    /// Attach a comment to an existing post.
    pub async fn add_comment(
        &self,
        session: &AuthSession,
        post_id: &PostId,
        draft: &NewComment,
    ) -> Result<Comment> {
        let text = draft.text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("Comment text cannot be empty".to_string()));
        }
        if self.get_post_by_id(session, post_id).await?.is_none() {
            return Err(Error::NotFound(format!("Post {post_id} not found")));
        }

        let id = CommentId::generate();
        let draft = NewComment {
            author: draft.author.clone(),
            text: text.to_string(),
        };
        let write = Write::set(comment_path(post_id, &id)?, to_fields(&draft.record(&id))?)
            .with_transform(FIELD_CREATED_AT, FieldTransform::ServerTimestamp)
            .require(Precondition::Exists(false));
        self.store
            .commit(session, vec![write])
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to add comment to post {post_id}: {error}");
            })?;

        self.get_comment_by_id(session, post_id, &id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Comment {id} vanished after creation")))
    }

    pub async fn get_comment_by_id(
        &self,
        session: &AuthSession,
        post_id: &PostId,
        comment_id: &CommentId,
    ) -> Result<Option<Comment>> {
        let document = self
            .store
            .get(session, &comment_path(post_id, comment_id)?)
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to fetch comment {comment_id}: {error}");
            })?;
        document.as_ref().map(decode_keyed).transpose()
    }

    /// Comments on a post, oldest first.
    pub async fn get_comments_by_post_id(
        &self,
        session: &AuthSession,
        post_id: &PostId,
    ) -> Result<Vec<Comment>> {
        let query = Query::new(post_path(post_id)?.collection(COMMENTS)?)
            .order_by(FIELD_CREATED_AT, Direction::Ascending);
        self.run_query(session, &query).await
    }

    /// Delete a comment written by the signed-in user.
    pub async fn delete_comment(
        &self,
        session: &AuthSession,
        post_id: &PostId,
        comment_id: &CommentId,
    ) -> Result<()> {
        let path = comment_path(post_id, comment_id)?;
        let document = self
            .store
            .get(session, &path)
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to fetch comment {comment_id}: {error}");
            })?
            .ok_or_else(|| Error::NotFound(format!("Comment {comment_id} not found")))?;

        let comment: Comment = decode_keyed(&document)?;
        let caller = session.user_id();
        if !comment.is_authored_by(&caller) {
            tracing::warn!("User {caller} attempted to delete comment {comment_id} of another user");
            return Err(Error::PermissionDenied(
                "Only the author can delete this comment".to_string(),
            ));
        }

        self.store
            .commit(session, vec![Write::delete(path).require(version_of(&document))])
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to delete comment {comment_id}: {error}");
            })
    }

    async fn run_query<T: serde::de::DeserializeOwned>(
        &self,
        session: &AuthSession,
        query: &Query,
    ) -> Result<Vec<T>> {
        let documents = self
            .store
            .run_query(session, query)
            .await
            .inspect_err(|error| {
                tracing::error!("Query on {} failed: {error}", query.collection);
            })?;
        documents.iter().map(decode_keyed).collect()
    }
}

/// Posts and comments written by other clients may carry their id only as the document name.
fn decode_keyed<T: serde::de::DeserializeOwned>(document: &Document) -> Result<T> {
    document.decode_with_id(ID_FIELD)
}

fn version_of(document: &Document) -> Precondition {
    document
        .update_time
        .map_or(Precondition::Exists(true), Precondition::UpdatedAt)
}

fn liked_transform(post_id: &PostId, liked: bool) -> FieldTransform {
    let values: Vec<Value> = vec![json!(post_id)];
    if liked {
        FieldTransform::ArrayUnion(values)
    } else {
        FieldTransform::ArrayRemove(values)
    }
}

fn user_path(user_id: &UserId) -> Result<DocumentPath> {
    DocumentPath::new(USERS, user_id.as_str())
}

fn post_path(post_id: &PostId) -> Result<DocumentPath> {
    DocumentPath::new(POSTS, post_id.as_str())
}

fn comment_path(post_id: &PostId, comment_id: &CommentId) -> Result<DocumentPath> {
    post_path(post_id)?.collection(COMMENTS)?.doc(comment_id.as_str())
}
