//! A [`CounterStore`] backed by Cloud Firestore, spoken to over its REST API.
//!
//! Documents live at `users/{uid}/counters/{id}` and hold a single integer field, `value`.
use std::{cell::RefCell, collections::HashMap};

use serde_json::{Value, json};

use crate::{Counter, CounterId, CounterStore, StoreOp, SyncError, UserId};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: &str = "300";
/// Firestore rejects a commit with more writes than this.
const MAX_WRITES_PER_COMMIT: usize = 500;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_database() -> String {
    "(default)".to_string()
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: default_database(),
            base_url: default_base_url(),
            api_key: None,
        }
    }

    /// `projects/{project}/databases/{database}/documents`, as segments.
    fn documents_root(&self) -> [&str; 5] {
        [
            "projects",
            &self.project_id,
            "databases",
            &self.database,
            "documents",
        ]
    }

    fn document_name(&self, user: &UserId, id: &CounterId) -> String {
        format!(
            "{}/users/{user}/counters/{id}",
            self.documents_root().join("/")
        )
    }
}

pub struct FirestoreStore {
    client: reqwest::Client,
    config: FirestoreConfig,
    id_token: RefCell<Option<String>>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            id_token: RefCell::new(None),
        }
    }

    /// The signed-in user's ID token, sent as a bearer token. `None` sends unauthenticated requests.
    pub fn set_id_token(&self, id_token: Option<String>) {
        *self.id_token.borrow_mut() = id_token;
    }

    fn url(&self, extra: &[&str]) -> Result<reqwest::Url, SyncError> {
        let mut url = reqwest::Url::parse(&self.config.base_url).map_err(|e| {
            SyncError::unavailable("invalid-argument", format!("bad base url: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|_| SyncError::unavailable("invalid-argument", "base url cannot be a base"))?
            .pop_if_empty()
            .extend(self.config.documents_root())
            .extend(extra);
        if let Some(api_key) = &self.config.api_key {
            url.query_pairs_mut().append_pair("key", api_key);
        }
        Ok(url)
    }

    fn counters_url(&self, user: &UserId) -> Result<reqwest::Url, SyncError> {
        self.url(&["users", user.as_str(), "counters"])
    }

    fn counter_url(&self, user: &UserId, id: &CounterId) -> Result<reqwest::Url, SyncError> {
        self.url(&["users", user.as_str(), "counters", id.as_str()])
    }

    fn commit_url(&self) -> Result<reqwest::Url, SyncError> {
        let mut url = self.url(&[])?;
        // `.../documents` -> `.../documents:commit`
        let path = format!("{}:commit", url.path());
        url.set_path(&path);
        Ok(url)
    }

    async fn send(
        &self,
        op: StoreOp,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SyncError> {
        let id_token = self.id_token.borrow().clone();
        let request = match id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::unavailable("unavailable", format!("{op}: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(decode_error(op, status.as_u16(), &body))
    }

    /// Commits `writes` in order, at most [`MAX_WRITES_PER_COMMIT`] at a time. Each chunk is
    /// atomic on its own, so a failure can leave earlier chunks applied.
    async fn commit(&self, op: StoreOp, writes: Vec<Value>) -> Result<(), SyncError> {
        for chunk in writes.chunks(MAX_WRITES_PER_COMMIT) {
            let request = self
                .client
                .post(self.commit_url()?)
                .json(&json!({ "writes": chunk }));
            self.send(op, request).await?;
        }
        Ok(())
    }
}

impl CounterStore for FirestoreStore {
    async fn list_all(&self, user: &UserId) -> Result<Vec<Counter>, SyncError> {
        let mut counters = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.counters_url(user)?;
            url.query_pairs_mut().append_pair("pageSize", PAGE_SIZE);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self.send(StoreOp::ListAll, self.client.get(url)).await?;
            let body = response
                .text()
                .await
                .map_err(|e| SyncError::unavailable("unavailable", e.to_string()))?;
            let page: ListDocumentsResponse = serde_json::from_str(&body).map_err(|e| {
                SyncError::unavailable(
                    "data-loss",
                    format!("Failed to parse list response: {e}\nResponse body: {body}"),
                )
            })?;

            for document in page.documents {
                match document.into_counter() {
                    Ok(counter) => counters.push(counter),
                    Err(e) => log::warn!("Skipping malformed counter document: {e}"),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(counters)
    }

    async fn create_or_set_value(
        &self,
        user: &UserId,
        id: &CounterId,
        value: i64,
    ) -> Result<(), SyncError> {
        let mut url = self.counter_url(user, id)?;
        url.query_pairs_mut()
            .append_pair("updateMask.fieldPaths", "value");
        let request = self
            .client
            .patch(url)
            .json(&json!({ "fields": value_fields(value) }));
        self.send(StoreOp::CreateOrSetValue, request).await?;
        Ok(())
    }

    async fn apply_delta(
        &self,
        user: &UserId,
        id: &CounterId,
        delta: i64,
    ) -> Result<(), SyncError> {
        // a transform on a missing document creates it
        let write = json!({
            "transform": {
                "document": self.config.document_name(user, id),
                "fieldTransforms": [{
                    "fieldPath": "value",
                    "increment": { "integerValue": delta.to_string() },
                }],
            }
        });
        self.commit(StoreOp::ApplyDelta, vec![write]).await
    }

    async fn delete(&self, user: &UserId, id: &CounterId) -> Result<(), SyncError> {
        let request = self.client.delete(self.counter_url(user, id)?);
        self.send(StoreOp::Delete, request).await?;
        Ok(())
    }

    async fn batch_reset_existing_to_zero(&self, user: &UserId) -> Result<(), SyncError> {
        let existing = self.list_all(user).await?;
        if existing.is_empty() {
            return Ok(());
        }

        // the precondition keeps a record deleted since the listing from being recreated,
        // at the cost of failing the whole batch
        let writes = existing
            .iter()
            .map(|counter| {
                json!({
                    "update": {
                        "name": self.config.document_name(user, &counter.id),
                        "fields": value_fields(0),
                    },
                    "updateMask": { "fieldPaths": ["value"] },
                    "currentDocument": { "exists": true },
                })
            })
            .collect();
        self.commit(StoreOp::BatchReset, writes).await
    }

    async fn create_all(&self, user: &UserId, counters: &[Counter]) -> Result<(), SyncError> {
        let writes = counters
            .iter()
            .map(|counter| {
                json!({
                    "update": {
                        "name": self.config.document_name(user, &counter.id),
                        "fields": value_fields(counter.value),
                    },
                })
            })
            .collect();
        self.commit(StoreOp::CreateOrSetValue, writes).await
    }
}

fn value_fields(value: i64) -> Value {
    json!({ "value": { "integerValue": value.to_string() } })
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl Document {
    fn into_counter(self) -> Result<Counter, SyncError> {
        let raw_id = self.name.rsplit('/').next().unwrap_or_default();
        let id = CounterId::parse(raw_id)?;
        // a document without a value reads as zero
        let value = self.fields.get("value").and_then(integer_value).unwrap_or(0);
        Ok(Counter::new(id, value))
    }
}

/// Firestore sends 64-bit integers as strings; doubles show up if something else wrote the field.
fn integer_value(field: &Value) -> Option<i64> {
    if let Some(raw) = field.get("integerValue") {
        return match raw {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
    }
    field
        .get("doubleValue")
        .and_then(Value::as_f64)
        .map(|d| d as i64)
}

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Turns a non-2xx response into an error carrying Firestore's status as a kebab-case code.
fn decode_error(op: StoreOp, http_status: u16, body: &str) -> SyncError {
    let Ok(ErrorEnvelope { error }) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return SyncError::unavailable(format!("http-{http_status}"), body.to_string());
    };
    if error.status == "UNIMPLEMENTED" {
        return SyncError::NotImplemented(op.name());
    }
    let code = if error.status.is_empty() {
        format!("http-{http_status}")
    } else {
        error.status.to_lowercase().replace('_', "-")
    };
    SyncError::unavailable(code, error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FirestoreStore {
        FirestoreStore::new(FirestoreConfig::new("demo-project"))
    }

    fn user() -> UserId {
        UserId::parse("uid 1").unwrap()
    }

    #[test]
    fn urls_are_built_from_encoded_segments() {
        let store = store();
        let url = store
            .counter_url(&user(), &CounterId::parse("4").unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents/users/uid%201/counters/4"
        );
        assert_eq!(
            store.commit_url().unwrap().as_str(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents:commit"
        );
    }

    #[test]
    fn document_names_are_resource_paths() {
        let config = FirestoreConfig::new("p");
        assert_eq!(
            config.document_name(&user(), &CounterId::parse("2").unwrap()),
            "projects/p/databases/(default)/documents/users/uid 1/counters/2"
        );
    }

    #[test]
    fn list_response_decodes_counters() {
        let body = r#"{
            "documents": [
                {"name": "projects/p/databases/(default)/documents/users/u/counters/1",
                 "fields": {"value": {"integerValue": "-3"}}},
                {"name": "projects/p/databases/(default)/documents/users/u/counters/b",
                 "fields": {}},
                {"name": "projects/p/databases/(default)/documents/users/u/counters/c",
                 "fields": {"value": {"doubleValue": 2.0}}}
            ],
            "nextPageToken": "abc"
        }"#;
        let page: ListDocumentsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        let counters: Vec<_> = page
            .documents
            .into_iter()
            .map(|d| d.into_counter().unwrap())
            .map(|c| (c.id.to_string(), c.value))
            .collect();
        assert_eq!(
            counters,
            vec![
                ("1".to_string(), -3),
                ("b".to_string(), 0),
                ("c".to_string(), 2)
            ]
        );
    }

    #[test]
    fn empty_collection_has_no_documents_key() {
        let page: ListDocumentsResponse = serde_json::from_str("{}").unwrap();
        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn errors_carry_firestore_status() {
        let body = r#"{"error": {"code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED"}}"#;
        let err = decode_error(StoreOp::ApplyDelta, 403, body);
        assert_eq!(err.code(), "permission-denied");

        let body = r#"{"error": {"code": 501, "message": "nope", "status": "UNIMPLEMENTED"}}"#;
        assert_eq!(
            decode_error(StoreOp::BatchReset, 501, body),
            SyncError::NotImplemented("batch_reset_existing_to_zero")
        );

        assert_eq!(
            decode_error(StoreOp::Delete, 502, "<html>bad gateway</html>").code(),
            "http-502"
        );
    }
}
