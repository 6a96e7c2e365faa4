//! Cloud Firestore REST (v1) document store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{
    Direction, Document, DocumentPath, DocumentStore, FieldTransform, Fields, Precondition, Query,
    Write, WriteKind,
};
use crate::auth::AuthSession;
use crate::config::{normalize_endpoint_url, BackendConfig};
use crate::util::error_excerpt;
use crate::{Error, Result};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DATABASE: &str = "(default)";

#[derive(Clone, Debug)]
pub struct FirestoreClient {
    base_url: String,
    project_id: String,
    client: Client,
}

impl FirestoreClient {
    pub fn new(firestore_url: &str, project_id: impl Into<String>) -> Result<Self> {
        let base_url = normalize_endpoint_url(firestore_url).ok_or_else(|| {
            Error::InvalidInput("Firestore URL must include http:// or https://".to_string())
        })?;
        let project_id = project_id.into().trim().to_string();
        if project_id.is_empty() {
            return Err(Error::InvalidInput(
                "Firestore project id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            project_id,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()?,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.endpoints.firestore_url, config.project_id.clone())
    }

    fn database_name(&self) -> String {
        format!("projects/{}/databases/{DEFAULT_DATABASE}", self.project_id)
    }

    fn documents_root(&self) -> String {
        format!("{}/documents", self.database_name())
    }

    fn document_name(&self, path: &DocumentPath) -> String {
        format!("{}/{path}", self.documents_root())
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{resource}", self.base_url)
    }

    fn into_document(&self, raw: RawDocument) -> Result<Document> {
        let root = format!("{}/", self.documents_root());
        let relative = raw.name.strip_prefix(&root).ok_or_else(|| {
            Error::Store(format!("Document name outside this database: {}", raw.name))
        })?;

        Ok(Document {
            path: DocumentPath::parse(relative)?,
            fields: decode_fields(&raw.fields.unwrap_or_default())?,
            create_time: raw.create_time.as_deref().map(parse_timestamp).transpose()?,
            update_time: raw.update_time.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn encode_write(&self, write: &Write) -> Value {
        let name = self.document_name(&write.path);
        let transforms: Vec<Value> = write
            .transforms
            .iter()
            .map(|(field, transform)| encode_transform(field, transform))
            .collect();

        let mut out = Map::new();
        match &write.kind {
            WriteKind::Set(fields) => {
                out.insert(
                    "update".to_string(),
                    json!({ "name": name, "fields": encode_fields(fields) }),
                );
            }
            WriteKind::Merge(fields) => {
                out.insert(
                    "update".to_string(),
                    json!({ "name": name, "fields": encode_fields(fields) }),
                );
                let paths: Vec<String> = fields.keys().map(|key| quote_field_path(key)).collect();
                out.insert("updateMask".to_string(), json!({ "fieldPaths": paths }));
            }
            WriteKind::Transform => {
                out.insert(
                    "transform".to_string(),
                    json!({ "document": name, "fieldTransforms": transforms }),
                );
            }
            WriteKind::Delete => {
                out.insert("delete".to_string(), Value::String(name));
            }
        }

        if matches!(write.kind, WriteKind::Set(_) | WriteKind::Merge(_)) && !transforms.is_empty()
        {
            out.insert("updateTransforms".to_string(), Value::Array(transforms));
        }

        match write.precondition {
            Some(Precondition::Exists(exists)) => {
                out.insert("currentDocument".to_string(), json!({ "exists": exists }));
            }
            Some(Precondition::UpdatedAt(at)) => {
                out.insert(
                    "currentDocument".to_string(),
                    json!({ "updateTime": at.to_rfc3339_opts(SecondsFormat::Nanos, true) }),
                );
            }
            None => {}
        }

        Value::Object(out)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn get(&self, session: &AuthSession, path: &DocumentPath) -> Result<Option<Document>> {
        let request = authorized(self.client.get(self.url(&self.document_name(path))), session);
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(store_error("get", status, &body));
        }

        let raw = response.json::<RawDocument>().await?;
        self.into_document(raw).map(Some)
    }

    async fn run_query(&self, session: &AuthSession, query: &Query) -> Result<Vec<Document>> {
        let parent = query.collection.parent.as_ref().map_or_else(
            || self.documents_root(),
            |parent| self.document_name(parent),
        );
        let request = authorized(
            self.client
                .post(self.url(&format!("{parent}:runQuery")))
                .json(&json!({ "structuredQuery": encode_query(query) })),
            session,
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(store_error("runQuery", status, &body));
        }

        let rows = response.json::<Vec<RunQueryRow>>().await?;
        rows.into_iter()
            .filter_map(|row| row.document)
            .map(|raw| self.into_document(raw))
            .collect()
    }

    async fn commit(&self, session: &AuthSession, writes: Vec<Write>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let encoded: Vec<Value> = writes.iter().map(|write| self.encode_write(write)).collect();
        let request = authorized(
            self.client
                .post(self.url(&format!("{}/documents:commit", self.database_name())))
                .json(&json!({ "writes": encoded })),
            session,
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(store_error("commit", status, &body));
        }
        Ok(())
    }
}

fn authorized(builder: RequestBuilder, session: &AuthSession) -> RequestBuilder {
    builder.bearer_auth(&session.id_token)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    fields: Option<Map<String, Value>>,
    create_time: Option<String>,
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryRow {
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct RawErrorEnvelope {
    error: RawError,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

fn store_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<RawErrorEnvelope>(body)
        .ok()
        .or_else(|| {
            serde_json::from_str::<Vec<RawErrorEnvelope>>(body)
                .ok()
                .and_then(|mut rows| (!rows.is_empty()).then(|| rows.remove(0)))
        })
        .map(|envelope| envelope.error);

    let Some(error) = parsed else {
        return Error::Store(format!(
            "Firestore {operation} failed with HTTP {}: {}",
            status.as_u16(),
            error_excerpt(body)
        ));
    };

    let code = error.code.unwrap_or_else(|| status.as_u16());
    let message = format!(
        "Firestore {operation}: {} ({code})",
        error.message.as_deref().unwrap_or("no message").trim()
    );
    match error.status.as_deref() {
        Some("ALREADY_EXISTS" | "FAILED_PRECONDITION" | "ABORTED") => Error::Conflict(message),
        Some("NOT_FOUND") => Error::NotFound(message),
        Some("PERMISSION_DENIED" | "UNAUTHENTICATED") => Error::PermissionDenied(message),
        _ => Error::Store(message),
    }
}

fn encode_query(query: &Query) -> Value {
    let mut structured = Map::new();
    structured.insert(
        "from".to_string(),
        json!([{ "collectionId": query.collection.collection_id }]),
    );

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|(field, value)| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": quote_field_path(field) },
                    "op": "EQUAL",
                    "value": encode_value(value),
                }
            })
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => {
            structured.insert("where".to_string(), filters[0].clone());
        }
        _ => {
            structured.insert(
                "where".to_string(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".to_string(),
            json!([{ "field": { "fieldPath": quote_field_path(field) }, "direction": direction }]),
        );
    }
    if let Some(limit) = query.limit {
        structured.insert("limit".to_string(), json!(limit));
    }

    Value::Object(structured)
}

fn encode_transform(field: &str, transform: &FieldTransform) -> Value {
    let field_path = quote_field_path(field);
    match transform {
        FieldTransform::ServerTimestamp => {
            json!({ "fieldPath": field_path, "setToServerValue": "REQUEST_TIME" })
        }
        FieldTransform::ArrayUnion(values) => json!({
            "fieldPath": field_path,
            "appendMissingElements": { "values": values.iter().map(encode_value).collect::<Vec<_>>() },
        }),
        FieldTransform::ArrayRemove(values) => json!({
            "fieldPath": field_path,
            "removeAllFromArray": { "values": values.iter().map(encode_value).collect::<Vec<_>>() },
        }),
        FieldTransform::Increment(delta) => json!({
            "fieldPath": field_path,
            "increment": { "integerValue": delta.to_string() },
        }),
    }
}

/// Backtick-quote field names that are not plain identifiers.
fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                json!({ "integerValue": integer.to_string() })
            } else {
                json!({ "doubleValue": number.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(values) => {
            json!({ "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Fields> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

fn decode_value(value: &Value) -> Result<Value> {
    let Some((kind, inner)) = value.as_object().and_then(|object| object.iter().next()) else {
        return Err(Error::Store(format!("Malformed Firestore value: {value}")));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or(false))),
        "integerValue" => {
            let integer = match inner {
                Value::String(text) => text.parse::<i64>().ok(),
                Value::Number(number) => number.as_i64(),
                _ => None,
            }
            .ok_or_else(|| Error::Store(format!("Malformed integerValue: {inner}")))?;
            Ok(Value::from(integer))
        }
        "doubleValue" => Ok(inner
            .as_f64()
            .map_or(Value::Null, Value::from)),
        "timestampValue" | "stringValue" | "bytesValue" | "referenceValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(Value::from(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(Value::from(0.0)),
        })),
        "arrayValue" => inner
            .get("values")
            .and_then(Value::as_array)
            .map_or_else(|| Ok(Vec::new()), |values| values.iter().map(decode_value).collect())
            .map(Value::Array),
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map_or_else(|| Ok(Map::new()), decode_fields)
            .map(Value::Object),
        other => Err(Error::Store(format!("Unsupported Firestore value type: {other}"))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| Error::Store(format!("Invalid timestamp {raw:?}: {error}")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::AuthUser;
    use crate::store::CollectionPath;

    const DOCS: &str = "/v1/projects/demo/databases/(default)/documents";

    fn session() -> AuthSession {
        AuthSession {
            id_token: "id-token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
            user: AuthUser {
                id: "uid-1".to_string(),
                email: None,
                display_name: None,
                photo_url: None,
            },
        }
    }

    fn client(server: &MockServer) -> FirestoreClient {
        FirestoreClient::new(&server.uri(), "demo").unwrap()
    }

    #[test]
    fn decode_value_handles_nested_types() {
        let raw = json!({
            "mapValue": { "fields": {
                "lat": { "doubleValue": 37.5 },
                "count": { "integerValue": "3" },
                "tags": { "arrayValue": { "values": [ { "stringValue": "a" } ] } },
                "empty": { "arrayValue": {} },
                "at": { "timestampValue": "2024-05-01T10:00:00.123456Z" }
            } }
        });
        assert_eq!(
            decode_value(&raw).unwrap(),
            json!({
                "lat": 37.5,
                "count": 3,
                "tags": ["a"],
                "empty": [],
                "at": "2024-05-01T10:00:00.123456Z"
            })
        );
    }

    #[test]
    fn encode_value_distinguishes_integers_and_doubles() {
        assert_eq!(encode_value(&json!(0)), json!({ "integerValue": "0" }));
        assert_eq!(encode_value(&json!(-122.0)), json!({ "doubleValue": -122.0 }));
        assert_eq!(encode_value(&json!(null)), json!({ "nullValue": null }));
    }

    #[test]
    fn quote_field_path_escapes_special_names() {
        assert_eq!(quote_field_path("likedPosts"), "likedPosts");
        assert_eq!(quote_field_path("imageURL"), "imageURL");
        assert_eq!(quote_field_path("a.b"), "`a.b`");
        assert_eq!(quote_field_path("1st"), "`1st`");
    }

    #[test]
    fn store_error_maps_precondition_failures_to_conflict() {
        let body = r#"{"error":{"code":409,"message":"Document already exists","status":"ALREADY_EXISTS"}}"#;
        assert!(matches!(
            store_error("commit", StatusCode::CONFLICT, body),
            Error::Conflict(_)
        ));
        let body = r#"[{"error":{"code":403,"message":"Missing permissions","status":"PERMISSION_DENIED"}}]"#;
        assert!(matches!(
            store_error("runQuery", StatusCode::FORBIDDEN, body),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(
            store_error("get", StatusCode::BAD_GATEWAY, "upstream down"),
            Error::Store(message) if message.contains("502")
        ));
    }

    #[test]
    fn encode_write_merges_with_mask_and_transforms() {
        let client = FirestoreClient::new("https://firestore.example", "demo").unwrap();
        let mut fields = Fields::new();
        fields.insert("profilePicture".to_string(), json!("http://pic"));
        let write = Write::merge(DocumentPath::new("users", "u1").unwrap(), fields)
            .with_transform("posts", FieldTransform::ArrayUnion(vec![json!("p1")]))
            .require(Precondition::Exists(true));

        assert_eq!(
            client.encode_write(&write),
            json!({
                "update": {
                    "name": "projects/demo/databases/(default)/documents/users/u1",
                    "fields": { "profilePicture": { "stringValue": "http://pic" } }
                },
                "updateMask": { "fieldPaths": ["profilePicture"] },
                "updateTransforms": [{
                    "fieldPath": "posts",
                    "appendMissingElements": { "values": [ { "stringValue": "p1" } ] }
                }],
                "currentDocument": { "exists": true }
            })
        );
    }

    #[test]
    fn encode_query_combines_filters() {
        let query = Query::new(CollectionPath::root("posts").unwrap())
            .where_eq("postedBy", "u1")
            .where_eq("username", "alice")
            .order_by("createdAt", Direction::Descending)
            .limit(5);
        let encoded = encode_query(&query);
        assert_eq!(encoded["where"]["compositeFilter"]["op"], json!("AND"));
        assert_eq!(encoded["orderBy"][0]["direction"], json!("DESCENDING"));
        assert_eq!(encoded["limit"], json!(5));
    }

    #[tokio::test]
    async fn get_decodes_document_and_versions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/users/u1")))
            .and(header("authorization", "Bearer id-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/users/u1",
                "fields": {
                    "username": { "stringValue": "alice" },
                    "posts": { "arrayValue": {} }
                },
                "createTime": "2024-05-01T10:00:00.000001Z",
                "updateTime": "2024-05-01T10:00:01.000002Z"
            })))
            .mount(&server)
            .await;

        let document = client(&server)
            .get(&session(), &DocumentPath::new("users", "u1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.path.to_string(), "users/u1");
        assert_eq!(document.fields["username"], json!("alice"));
        assert_eq!(document.fields["posts"], json!([]));
        assert!(document.update_time > document.create_time);
    }

    #[tokio::test]
    async fn get_missing_document_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "not found", "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        let document = client(&server)
            .get(&session(), &DocumentPath::new("users", "nobody").unwrap())
            .await
            .unwrap();
        assert!(document.is_none());
    }

    #[tokio::test]
    async fn run_query_targets_parent_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}/posts/p1:runQuery")))
            .and(body_partial_json(json!({
                "structuredQuery": { "from": [ { "collectionId": "comments" } ] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "readTime": "2024-05-01T10:00:00Z" },
                { "document": {
                    "name": "projects/demo/databases/(default)/documents/posts/p1/comments/c1",
                    "fields": { "text": { "stringValue": "nice" } }
                } }
            ])))
            .mount(&server)
            .await;

        let post = DocumentPath::new("posts", "p1").unwrap();
        let query = Query::new(post.collection("comments").unwrap());
        let documents = client(&server).run_query(&session(), &query).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].path.id(), "c1");
    }

    #[tokio::test]
    async fn commit_reports_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{DOCS}:commit")))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": 409, "message": "Document already exists", "status": "ALREADY_EXISTS" }
            })))
            .mount(&server)
            .await;

        let write = Write::set(DocumentPath::new("users", "u1").unwrap(), Fields::new())
            .require(Precondition::Exists(false));
        let err = client(&server)
            .commit(&session(), vec![write])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
