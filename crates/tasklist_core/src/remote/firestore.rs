//! Firestore REST document collection.
//!
//! # Responsibility
//! - Map collection CRUD onto the Firestore v1 REST endpoints.
//! - Encode task documents as typed Firestore field values.
//!
//! # Invariants
//! - Updates only touch `title`, `done` and `tags` and require the document
//!   to exist.
//! - Listing follows `nextPageToken` until exhausted.
//! - Request bodies and titles are never logged.

use super::{DocumentCollection, RemoteError, RemoteResult};
use crate::config::FirestoreConfig;
use crate::model::document::{StoredDocument, TodoDocument};
use crate::model::task::RemoteId;
use log::debug;
use serde_json::{json, Map, Value};
use std::time::Duration;

const PAGE_SIZE: &str = "300";
const MAX_ERROR_BODY_CHARS: usize = 200;
const UPDATE_MASK: [&str; 3] = ["title", "done", "tags"];

/// Collection client over `projects/{p}/databases/{d}/documents/{collection}`.
pub struct FirestoreCollection {
    agent: ureq::Agent,
    collection_url: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

impl FirestoreCollection {
    pub fn new(config: &FirestoreConfig, collection: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("tasklist/", env!("CARGO_PKG_VERSION")))
            .build();
        let collection_url = format!(
            "{}/projects/{}/databases/{}/documents/{}",
            config.base_url.trim_end_matches('/'),
            config.project_id,
            config.database,
            collection.trim()
        );
        Self {
            agent,
            collection_url,
            api_key: config.api_key.clone(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut request = self.agent.request(method, url);
        if let Some(key) = self.api_key.as_deref() {
            request = request.query("key", key);
        }
        if let Some(token) = self.bearer_token.as_deref() {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url, id)
    }
}

impl DocumentCollection for FirestoreCollection {
    fn backend_name(&self) -> &'static str {
        "firestore"
    }

    fn list_documents(&self) -> RemoteResult<Vec<StoredDocument>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request("GET", &self.collection_url)
                .query("pageSize", PAGE_SIZE);
            if let Some(token) = page_token.as_deref() {
                request = request.query("pageToken", token);
            }

            let body = read_json(request.call().map_err(|err| map_ureq_error(err, None))?)?;
            if let Some(page) = body.get("documents").and_then(Value::as_array) {
                for raw in page {
                    documents.push(decode_document(raw)?);
                }
            }

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        debug!(
            "event=remote_list module=firestore status=ok count={}",
            documents.len()
        );
        Ok(documents)
    }

    fn create_document(&self, document: &TodoDocument) -> RemoteResult<RemoteId> {
        let response = self
            .request("POST", &self.collection_url)
            .send_json(json!({ "fields": encode_fields(document) }))
            .map_err(|err| map_ureq_error(err, None))?;
        let created = decode_document(&read_json(response)?)?;
        Ok(created.id)
    }

    fn update_document(&self, id: &str, document: &TodoDocument) -> RemoteResult<()> {
        let mut request = self
            .request("PATCH", &self.document_url(id))
            .query("currentDocument.exists", "true");
        for field in UPDATE_MASK {
            request = request.query("updateMask.fieldPaths", field);
        }
        request
            .send_json(json!({ "fields": encode_fields(document) }))
            .map_err(|err| map_ureq_error(err, Some(id)))?;
        Ok(())
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        self.request("DELETE", &self.document_url(id))
            .call()
            .map_err(|err| map_ureq_error(err, Some(id)))?;
        Ok(())
    }
}

/// Encodes a document as a Firestore `fields` map.
pub fn encode_fields(document: &TodoDocument) -> Value {
    let tags = document
        .tags
        .iter()
        .map(|tag| json!({ "stringValue": tag }))
        .collect::<Vec<_>>();
    json!({
        "title": { "stringValue": document.title },
        "done": { "booleanValue": document.done },
        "tags": { "arrayValue": { "values": tags } },
    })
}

/// Decodes one Firestore document resource.
///
/// Missing or mistyped fields fall back to defaults; a missing resource
/// name is an error since the id cannot be recovered.
pub fn decode_document(raw: &Value) -> RemoteResult<StoredDocument> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::InvalidData("document resource has no name".to_string()))?;
    let id = document_id_from_name(name).ok_or_else(|| {
        RemoteError::InvalidData(format!("cannot derive document id from `{name}`"))
    })?;

    let empty = Map::new();
    let fields = raw
        .get("fields")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let title = fields
        .get("title")
        .and_then(|value| value.get("stringValue"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let done = fields
        .get("done")
        .and_then(|value| value.get("booleanValue"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let tags = fields
        .get("tags")
        .and_then(|value| value.get("arrayValue"))
        .and_then(|value| value.get("values"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.get("stringValue").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(StoredDocument {
        id: id.to_string(),
        document: TodoDocument { title, done, tags },
    })
}

/// Returns the trailing segment of a document resource name.
pub fn document_id_from_name(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|segment| !segment.is_empty())
}

fn read_json(response: ureq::Response) -> RemoteResult<Value> {
    response
        .into_json::<Value>()
        .map_err(|err| RemoteError::InvalidData(format!("response is not valid JSON: {err}")))
}

fn map_ureq_error(err: ureq::Error, id: Option<&str>) -> RemoteError {
    match (err, id) {
        (ureq::Error::Status(404, _), Some(id)) => RemoteError::NotFound(id.to_string()),
        (ureq::Error::Status(status, response), _) => {
            let body = response.into_string().unwrap_or_default();
            RemoteError::Rejected {
                status,
                message: truncate(body.trim(), MAX_ERROR_BODY_CHARS),
            }
        }
        (ureq::Error::Transport(transport), _) => RemoteError::Unavailable(transport.to_string()),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    if value.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
