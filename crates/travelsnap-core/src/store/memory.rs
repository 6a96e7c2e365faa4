//! In-process document store with the same commit semantics as the remote one.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    Direction, Document, DocumentPath, DocumentStore, FieldTransform, Fields, Precondition, Query,
    Write, WriteKind,
};
use crate::auth::AuthSession;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<DocumentPath, StoredDocument>,
    last_commit: Option<DateTime<Utc>>,
    pending_failure: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: Fields,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `Error::Store(message)` without applying anything.
    pub async fn fail_next_commit(&self, message: impl Into<String>) {
        self.state.lock().await.pending_failure = Some(message.into());
    }

    /// Number of stored documents across all collections.
    pub async fn len(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl State {
    /// Commit times are strictly increasing with microsecond precision.
    fn next_commit_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let at = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(at);
        at
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, _session: &AuthSession, path: &DocumentPath) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .get(path)
            .map(|stored| to_document(path, stored)))
    }

    async fn run_query(&self, _session: &AuthSession, query: &Query) -> Result<Vec<Document>> {
        let state = self.state.lock().await;
        let mut matches: Vec<(&DocumentPath, &StoredDocument)> = state
            .documents
            .iter()
            .filter(|(path, _)| path.parent() == query.collection)
            .filter(|(_, stored)| {
                query
                    .filters
                    .iter()
                    .all(|(field, expected)| stored.fields.get(field) == Some(expected))
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            matches.retain(|(_, stored)| stored.fields.contains_key(field));
            matches.sort_by(|(left_path, left), (right_path, right)| {
                compare_values(&left.fields[field], &right.fields[field])
                    .then_with(|| left_path.cmp(right_path))
            });
            if *direction == Direction::Descending {
                matches.reverse();
            }
        }

        let limit = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|(path, stored)| to_document(path, stored))
            .collect())
    }

    async fn commit(&self, _session: &AuthSession, writes: Vec<Write>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.pending_failure.take() {
            return Err(Error::Store(message));
        }

        let at = state.next_commit_time();
        let mut staged = state.documents.clone();
        for write in writes {
            apply_write(&mut staged, write, at)?;
        }
        state.documents = staged;
        Ok(())
    }
}

fn to_document(path: &DocumentPath, stored: &StoredDocument) -> Document {
    Document {
        path: path.clone(),
        fields: stored.fields.clone(),
        create_time: Some(stored.create_time),
        update_time: Some(stored.update_time),
    }
}

fn apply_write(
    documents: &mut BTreeMap<DocumentPath, StoredDocument>,
    write: Write,
    at: DateTime<Utc>,
) -> Result<()> {
    let existing = documents.get(&write.path);
    match write.precondition {
        Some(Precondition::Exists(true)) if existing.is_none() => {
            return Err(Error::NotFound(format!("No document at {}", write.path)));
        }
        Some(Precondition::Exists(false)) if existing.is_some() => {
            return Err(Error::Conflict(format!(
                "Document already exists: {}",
                write.path
            )));
        }
        Some(Precondition::UpdatedAt(expected))
            if existing.map(|stored| stored.update_time) != Some(expected) =>
        {
            return Err(Error::Conflict(format!(
                "Document {} changed since it was read",
                write.path
            )));
        }
        _ => {}
    }

    let create_time = existing.map_or(at, |stored| stored.create_time);
    let mut fields = match write.kind {
        WriteKind::Delete => {
            documents.remove(&write.path);
            return Ok(());
        }
        WriteKind::Set(fields) => fields,
        WriteKind::Merge(update) => {
            let mut fields = existing.map(|stored| stored.fields.clone()).unwrap_or_default();
            fields.extend(update);
            fields
        }
        WriteKind::Transform => existing.map(|stored| stored.fields.clone()).unwrap_or_default(),
    };

    for (field, transform) in write.transforms {
        apply_transform(&mut fields, field, transform, at);
    }

    documents.insert(
        write.path,
        StoredDocument {
            fields,
            create_time,
            update_time: at,
        },
    );
    Ok(())
}

fn apply_transform(fields: &mut Fields, field: String, transform: FieldTransform, at: DateTime<Utc>) {
    match transform {
        FieldTransform::ServerTimestamp => {
            fields.insert(
                field,
                Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            );
        }
        FieldTransform::ArrayUnion(values) => {
            let mut current = take_array(fields, &field);
            for value in values {
                if !current.contains(&value) {
                    current.push(value);
                }
            }
            fields.insert(field, Value::Array(current));
        }
        FieldTransform::ArrayRemove(values) => {
            let mut current = take_array(fields, &field);
            current.retain(|value| !values.contains(value));
            fields.insert(field, Value::Array(current));
        }
        FieldTransform::Increment(delta) => {
            let next = match fields.get(&field) {
                Some(Value::Number(number)) => number.as_i64().map_or_else(
                    || Value::from(number.as_f64().unwrap_or(0.0) + delta_as_f64(delta)),
                    |current| Value::from(current.saturating_add(delta)),
                ),
                _ => Value::from(delta),
            };
            fields.insert(field, next);
        }
    }
}

/// Deltas outside the `i32` range saturate; counters never get near them.
fn delta_as_f64(delta: i64) -> f64 {
    let clamped = i32::try_from(delta).unwrap_or(if delta < 0 { i32::MIN } else { i32::MAX });
    f64::from(clamped)
}

fn take_array(fields: &mut Fields, field: &str) -> Vec<Value> {
    match fields.remove(field) {
        Some(Value::Array(values)) => values,
        _ => Vec::new(),
    }
}

/// Orders nulls, booleans, numbers and strings the way the remote store does.
fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&b.as_f64().unwrap_or(0.0)),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::auth::AuthUser;
    use crate::store::CollectionPath;

    fn session() -> AuthSession {
        AuthSession {
            id_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
            user: AuthUser {
                id: "u1".to_string(),
                email: None,
                display_name: None,
                photo_url: None,
            },
        }
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(fields) => fields,
            _ => panic!("expected object"),
        }
    }

    fn user_path() -> DocumentPath {
        DocumentPath::new("users", "u1").unwrap()
    }

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = MemoryDocumentStore::new();
        let session = session();
        store
            .commit(
                &session,
                vec![Write::set(user_path(), fields(json!({"username": "alice", "posts": []})))],
            )
            .await
            .unwrap();
        store
            .commit(
                &session,
                vec![Write::merge(user_path(), fields(json!({"profilePicture": "http://pic"})))],
            )
            .await
            .unwrap();

        let document = store.get(&session, &user_path()).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(document.fields),
            json!({"username": "alice", "posts": [], "profilePicture": "http://pic"})
        );
    }

    #[tokio::test]
    async fn failed_precondition_rolls_back_whole_commit() {
        let store = MemoryDocumentStore::new();
        let session = session();
        let post = DocumentPath::new("posts", "p1").unwrap();

        let err = store
            .commit(
                &session,
                vec![
                    Write::transform(user_path())
                        .with_transform("likedPosts", FieldTransform::ArrayUnion(vec![json!("p1")])),
                    Write::transform(post.clone())
                        .with_transform("likesCount", FieldTransform::Increment(1))
                        .require(Precondition::Exists(true)),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn array_transforms_behave_as_sets() {
        let store = MemoryDocumentStore::new();
        let session = session();
        let union = |value: &str| {
            Write::transform(user_path())
                .with_transform("posts", FieldTransform::ArrayUnion(vec![json!(value)]))
        };
        store.commit(&session, vec![union("a")]).await.unwrap();
        store.commit(&session, vec![union("a")]).await.unwrap();
        store.commit(&session, vec![union("b")]).await.unwrap();
        store
            .commit(
                &session,
                vec![Write::transform(user_path())
                    .with_transform("posts", FieldTransform::ArrayRemove(vec![json!("a")]))],
            )
            .await
            .unwrap();

        let document = store.get(&session, &user_path()).await.unwrap().unwrap();
        assert_eq!(document.fields["posts"], json!(["b"]));
    }

    #[test]
    fn increment_adds_to_integers_and_floats() {
        let at = Utc::now();
        let mut doc = fields(json!({"likesCount": 2, "score": 1.5}));
        apply_transform(&mut doc, "likesCount".to_string(), FieldTransform::Increment(-1), at);
        apply_transform(&mut doc, "score".to_string(), FieldTransform::Increment(2), at);
        apply_transform(&mut doc, "missing".to_string(), FieldTransform::Increment(3), at);
        assert_eq!(doc["likesCount"], json!(1));
        assert_eq!(doc["score"], json!(3.5));
        assert_eq!(doc["missing"], json!(3));
    }

    #[tokio::test]
    async fn update_time_precondition_detects_concurrent_change() {
        let store = MemoryDocumentStore::new();
        let session = session();
        store
            .commit(&session, vec![Write::set(user_path(), Fields::new())])
            .await
            .unwrap();
        let read = store.get(&session, &user_path()).await.unwrap().unwrap();
        let stamp = read.update_time.unwrap();

        store
            .commit(
                &session,
                vec![Write::merge(user_path(), fields(json!({"username": "bob"})))],
            )
            .await
            .unwrap();

        let err = store
            .commit(
                &session,
                vec![Write::delete(user_path()).require(Precondition::UpdatedAt(stamp))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn conditional_create_rejects_existing_document() {
        let store = MemoryDocumentStore::new();
        let session = session();
        let create = || Write::set(user_path(), Fields::new()).require(Precondition::Exists(false));
        store.commit(&session, vec![create()]).await.unwrap();
        let err = store.commit(&session, vec![create()]).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryDocumentStore::new();
        let session = session();
        for (id, owner, likes) in [("p1", "u1", 3), ("p2", "u2", 1), ("p3", "u1", 7)] {
            store
                .commit(
                    &session,
                    vec![Write::set(
                        DocumentPath::new("posts", id).unwrap(),
                        fields(json!({"postedBy": owner, "likesCount": likes})),
                    )],
                )
                .await
                .unwrap();
        }

        let posts = CollectionPath::root("posts").unwrap();
        let mine = store
            .run_query(
                &session,
                &Query::new(posts.clone())
                    .where_eq("postedBy", "u1")
                    .order_by("likesCount", Direction::Descending),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = mine.iter().map(|doc| doc.path.id()).collect();
        assert_eq!(ids, vec!["p3", "p1"]);

        let first = store
            .run_query(&session, &Query::new(posts).limit(1))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].path.id(), "p1");
    }

    #[tokio::test]
    async fn subcollection_queries_do_not_leak_across_parents() {
        let store = MemoryDocumentStore::new();
        let session = session();
        for post in ["p1", "p2"] {
            let comments = DocumentPath::new("posts", post)
                .unwrap()
                .collection("comments")
                .unwrap();
            store
                .commit(
                    &session,
                    vec![Write::set(comments.doc("c1").unwrap(), fields(json!({"text": post})))],
                )
                .await
                .unwrap();
        }

        let comments = DocumentPath::new("posts", "p1")
            .unwrap()
            .collection("comments")
            .unwrap();
        let found = store.run_query(&session, &Query::new(comments)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fields["text"], json!("p1"));
    }

    #[tokio::test]
    async fn server_timestamp_and_injected_failure() {
        let store = MemoryDocumentStore::new();
        let session = session();
        store.fail_next_commit("backend offline").await;
        let write = Write::set(user_path(), Fields::new())
            .with_transform("createdAt", FieldTransform::ServerTimestamp);
        assert!(matches!(
            store.commit(&session, vec![write.clone()]).await,
            Err(Error::Store(message)) if message == "backend offline"
        ));

        store.commit(&session, vec![write]).await.unwrap();
        let document = store.get(&session, &user_path()).await.unwrap().unwrap();
        let stamp = document.fields["createdAt"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
