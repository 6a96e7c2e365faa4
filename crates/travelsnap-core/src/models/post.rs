//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorSnapshot, GeoPoint, PostId};

/// A published geotagged image with description and like count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(flatten)]
    pub author: AuthorSnapshot,
    pub description: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub geolocation: GeoPoint,
    #[serde(rename = "likesCount", default)]
    pub likes_count: i64,
    /// Assigned by the document store when the post is written
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the composer when publishing a post
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub author: AuthorSnapshot,
    pub description: String,
    pub image_url: String,
    pub geolocation: GeoPoint,
}

/// Write shape of a new post: everything except the server-assigned timestamp
#[derive(Serialize)]
pub(crate) struct PostRecord<'a> {
    pub id: &'a PostId,
    #[serde(flatten)]
    pub author: &'a AuthorSnapshot,
    pub description: &'a str,
    #[serde(rename = "imageURL")]
    pub image_url: &'a str,
    pub geolocation: GeoPoint,
    #[serde(rename = "likesCount")]
    pub likes_count: i64,
}

impl NewPost {
    pub(crate) fn record<'a>(&'a self, id: &'a PostId) -> PostRecord<'a> {
        PostRecord {
            id,
            author: &self.author,
            description: &self.description,
            image_url: &self.image_url,
            geolocation: self.geolocation,
            likes_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::UserId;

    #[test]
    fn post_reads_document_fields() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "postedBy": "uid-1",
            "username": "alice",
            "description": "hello",
            "imageURL": "http://img",
            "geolocation": { "lat": 37.0, "lng": -122.0 },
            "likesCount": 3,
            "createdAt": "2024-05-01T10:00:00.000000Z"
        }))
        .unwrap();
        assert_eq!(post.id, PostId::from("p1"));
        assert_eq!(post.author.posted_by, UserId::new("uid-1"));
        assert_eq!(post.author.profile_picture, None);
        assert_eq!(post.likes_count, 3);
    }

    #[test]
    fn record_omits_created_at_and_starts_with_zero_likes() {
        let draft = NewPost {
            author: AuthorSnapshot {
                posted_by: UserId::new("uid-1"),
                username: "alice".to_string(),
                profile_picture: None,
            },
            description: "hello".to_string(),
            image_url: "http://img".to_string(),
            geolocation: GeoPoint { lat: 37.0, lng: -122.0 },
        };
        let id = PostId::from("p1");
        let value = serde_json::to_value(draft.record(&id)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "p1",
                "postedBy": "uid-1",
                "username": "alice",
                "description": "hello",
                "imageURL": "http://img",
                "geolocation": { "lat": 37.0, "lng": -122.0 },
                "likesCount": 0
            })
        );
    }
}
