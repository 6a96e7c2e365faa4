//! Document store abstraction: keyed documents, collection queries and
//! atomic batches of merge/transform writes.

mod firestore;
mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::AuthSession;
use crate::{Error, Result};

pub use firestore::FirestoreClient;
pub use memory::MemoryDocumentStore;

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// Slash-separated document path with an even number of segments
/// (`users/{uid}`, `posts/{postId}/comments/{commentId}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// Path of a document in a top-level collection.
    pub fn new(collection: &str, id: &str) -> Result<Self> {
        CollectionPath::root(collection)?.doc(id)
    }

    /// Parse `a/b[/c/d...]`.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path
            .trim()
            .trim_matches('/')
            .split('/')
            .map(ToOwned::to_owned)
            .collect();
        if segments.len() % 2 != 0 || segments.iter().any(|segment| !is_valid_segment(segment)) {
            return Err(Error::InvalidInput(format!("Invalid document path: {path}")));
        }
        Ok(Self { segments })
    }

    /// Sub-collection under this document.
    pub fn collection(&self, collection: &str) -> Result<CollectionPath> {
        let collection = validate_segment(collection, "collection")?;
        Ok(CollectionPath {
            parent: Some(self.clone()),
            collection_id: collection,
        })
    }

    /// Document id (last segment).
    #[must_use]
    pub fn id(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Collection containing this document.
    #[must_use]
    pub fn parent(&self) -> CollectionPath {
        let split = self.segments.len().saturating_sub(2);
        let parent = if split == 0 {
            None
        } else {
            Some(Self {
                segments: self.segments[..split].to_vec(),
            })
        };
        CollectionPath {
            parent,
            collection_id: self.segments[split].clone(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// A collection, optionally nested under a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    pub parent: Option<DocumentPath>,
    pub collection_id: String,
}

impl CollectionPath {
    pub fn root(collection: &str) -> Result<Self> {
        Ok(Self {
            parent: None,
            collection_id: validate_segment(collection, "collection")?,
        })
    }

    pub fn doc(&self, id: &str) -> Result<DocumentPath> {
        let id = validate_segment(id, "document id")?;
        let mut segments = self
            .parent
            .as_ref()
            .map(|parent| parent.segments.clone())
            .unwrap_or_default();
        segments.push(self.collection_id.clone());
        segments.push(id);
        Ok(DocumentPath { segments })
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{parent}/{}", self.collection_id),
            None => f.write_str(&self.collection_id),
        }
    }
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
    pub create_time: Option<DateTime<Utc>>,
    /// Version stamp usable in `Precondition::UpdatedAt`
    pub update_time: Option<DateTime<Utc>>,
}

impl Document {
    /// Deserialize the document's fields into a model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|error| {
            Error::Store(format!("Document {} has unexpected shape: {error}", self.path))
        })
    }

    /// Like [`decode`](Self::decode), filling `id_field` from the document name when absent.
    pub fn decode_with_id<T: DeserializeOwned>(&self, id_field: &str) -> Result<T> {
        let mut fields = self.fields.clone();
        fields
            .entry(id_field)
            .or_insert_with(|| Value::String(self.path.id().to_string()));
        serde_json::from_value(Value::Object(fields)).map_err(|error| {
            Error::Store(format!("Document {} has unexpected shape: {error}", self.path))
        })
    }
}

/// Server-side field transforms applied after a write's field values.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    /// Set to the commit time
    ServerTimestamp,
    /// Append the values not already present
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of the values
    ArrayRemove(Vec<Value>),
    /// Add to a numeric field (missing fields count as 0)
    Increment(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Exists(bool),
    UpdatedAt(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Replace the whole document
    Set(Fields),
    /// Overwrite only the given top-level fields, keeping the rest
    Merge(Fields),
    /// Only apply transforms
    Transform,
    Delete,
}

/// One write within an atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub path: DocumentPath,
    pub kind: WriteKind,
    pub transforms: Vec<(String, FieldTransform)>,
    pub precondition: Option<Precondition>,
}

impl Write {
    #[must_use]
    pub const fn set(path: DocumentPath, fields: Fields) -> Self {
        Self::new(path, WriteKind::Set(fields))
    }

    #[must_use]
    pub const fn merge(path: DocumentPath, fields: Fields) -> Self {
        Self::new(path, WriteKind::Merge(fields))
    }

    #[must_use]
    pub const fn transform(path: DocumentPath) -> Self {
        Self::new(path, WriteKind::Transform)
    }

    #[must_use]
    pub const fn delete(path: DocumentPath) -> Self {
        Self::new(path, WriteKind::Delete)
    }

    const fn new(path: DocumentPath, kind: WriteKind) -> Self {
        Self {
            path,
            kind,
            transforms: Vec::new(),
            precondition: None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, field: &str, transform: FieldTransform) -> Self {
        self.transforms.push((field.to_string(), transform));
        self
    }

    #[must_use]
    pub fn require(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Collection-scoped query with equality filters and a single ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<u32>,
}

impl Query {
    #[must_use]
    pub const fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Remote document store. Every call carries the caller's session.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, session: &AuthSession, path: &DocumentPath) -> Result<Option<Document>>;

    async fn run_query(&self, session: &AuthSession, query: &Query) -> Result<Vec<Document>>;

    /// Apply all writes atomically: either every write lands or none does.
    /// A failed precondition yields `Error::Conflict` (or `Error::NotFound`
    /// for `Exists(true)` on a missing document).
    async fn commit(&self, session: &AuthSession, writes: Vec<Write>) -> Result<()>;
}

/// Serialize a model into a document field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::InvalidInput(format!(
            "Documents must serialize to an object, got {other}"
        ))),
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('/')
}

fn validate_segment(segment: &str, what: &str) -> Result<String> {
    let segment = segment.trim();
    if is_valid_segment(segment) {
        Ok(segment.to_string())
    } else {
        Err(Error::InvalidInput(format!("Invalid {what}: {segment:?}")))
    }
}
