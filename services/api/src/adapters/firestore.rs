//! services/api/src/adapters/firestore.rs
//!
//! The document store adapter, the concrete implementation of the
//! `DocumentStore` port over the Firestore REST API (v1). Documents are kept
//! in the `relatos` and `portal-memoria` collections with snake_case fields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memoria_core::domain::{
    Moderation, NewSubmission, StatusChange, Submission, SubmissionContent, SubmissionKind,
    SubmissionMetadata, SubmissionSource, SubmissionStatus, Submitter,
};
use memoria_core::ports::{DocumentStore, PortError, PortResult, StatusQuery};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::http::{check, transport_error, ApiFailure};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct FirestoreStore {
    client: Client,
    /// `.../v1/projects/{project}/databases/(default)/documents`
    documents_url: String,
    token: Option<String>,
}

impl FirestoreStore {
    pub fn new(client: Client, project_id: &str, token: Option<String>) -> Self {
        Self::with_base_url(client, "https://firestore.googleapis.com", project_id, token)
    }

    /// Points the adapter at another host, e.g. the local emulator.
    pub fn with_base_url(client: Client, base_url: &str, project_id: &str, token: Option<String>) -> Self {
        Self {
            client,
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            token,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn document_url(&self, kind: SubmissionKind, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, kind.collection(), id)
    }
}

//=========================================================================================
// Wire Records and Typed-Value Encoding
//=========================================================================================

#[derive(Deserialize)]
struct DocumentRecord {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct QueryRow {
    document: Option<DocumentRecord>,
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn timestamp_value(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339() })
}

fn optional<T>(value: Option<T>, encode: impl FnOnce(T) -> Value) -> Value {
    match value {
        Some(v) => encode(v),
        None => json!({ "nullValue": null }),
    }
}

fn encode_new(new: &NewSubmission, moderation: &Moderation) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("name".into(), string_value(&new.submitter.name));
    fields.insert("surname".into(), string_value(&new.submitter.surname));
    fields.insert("phone".into(), string_value(&new.submitter.phone));
    fields.insert("dni_image_url".into(), string_value(&new.dni_image_url));
    fields.insert("status".into(), string_value(moderation.status.as_str()));
    fields.insert("created_at".into(), timestamp_value(moderation.created_at));
    fields.insert("updated_at".into(), timestamp_value(moderation.updated_at));

    match &new.content {
        SubmissionContent::Relato {
            title,
            content,
            banner_image_url,
        } => {
            fields.insert("title".into(), string_value(title));
            fields.insert("content".into(), string_value(content));
            fields.insert("banner_image_url".into(), string_value(banner_image_url));
        }
        SubmissionContent::PortalMemoria {
            description,
            image_url,
        } => {
            fields.insert("description".into(), string_value(description));
            fields.insert("image_url".into(), string_value(image_url));
        }
    }

    let metadata = &new.metadata;
    fields.insert(
        "metadata".into(),
        json!({ "mapValue": { "fields": {
            "submission_source": string_value(metadata.source.as_str()),
            "ip_address": optional(metadata.ip_address.as_deref(), string_value),
            "user_agent": optional(metadata.user_agent.as_deref(), string_value),
        }}}),
    );
    fields
}

/// Fields written by a status change, with the matching update mask.
fn encode_change(change: &StatusChange) -> (Map<String, Value>, Vec<&'static str>) {
    let mut fields = Map::new();
    fields.insert("status".into(), string_value(change.status.as_str()));
    fields.insert("updated_at".into(), timestamp_value(change.updated_at));
    fields.insert("approved_by".into(), string_value(&change.approved_by));
    let mut mask = vec!["status", "updated_at", "approved_by"];
    if let Some(approved_at) = change.approved_at {
        fields.insert("approved_at".into(), timestamp_value(approved_at));
        mask.push("approved_at");
    }
    if let Some(notes) = &change.admin_notes {
        fields.insert("admin_notes".into(), string_value(notes));
        mask.push("admin_notes");
    }
    (fields, mask)
}

fn malformed(name: &str, field: &str) -> PortError {
    PortError::platform("unknown-error", format!("document {} has no valid '{}'", name, field))
}

struct Fields<'a> {
    name: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn optional_string(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)?
            .get("stringValue")?
            .as_str()
            .map(str::to_string)
    }

    fn string(&self, field: &str) -> PortResult<String> {
        self.optional_string(field)
            .ok_or_else(|| malformed(self.name, field))
    }

    fn optional_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(field)?.get("timestampValue")?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    fn timestamp(&self, field: &str) -> PortResult<DateTime<Utc>> {
        self.optional_timestamp(field)
            .ok_or_else(|| malformed(self.name, field))
    }

    fn map(&self, field: &str) -> Option<Fields<'a>> {
        let inner = self.fields.get(field)?.get("mapValue")?.get("fields")?.as_object()?;
        Some(Fields {
            name: self.name,
            fields: inner,
        })
    }
}

fn decode(kind: SubmissionKind, record: &DocumentRecord) -> PortResult<Submission> {
    let f = Fields {
        name: &record.name,
        fields: &record.fields,
    };
    let id = record
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let status = f
        .string("status")?
        .parse::<SubmissionStatus>()
        .map_err(|_| malformed(&record.name, "status"))?;

    let content = match kind {
        SubmissionKind::Relatos => SubmissionContent::Relato {
            title: f.string("title")?,
            content: f.string("content")?,
            banner_image_url: f.string("banner_image_url")?,
        },
        SubmissionKind::PortalMemoria => SubmissionContent::PortalMemoria {
            description: f.string("description")?,
            image_url: f.string("image_url")?,
        },
    };

    let metadata = match f.map("metadata") {
        Some(m) => SubmissionMetadata {
            ip_address: m.optional_string("ip_address"),
            user_agent: m.optional_string("user_agent"),
            source: match m.optional_string("submission_source").as_deref() {
                Some("admin_upload") => SubmissionSource::AdminUpload,
                _ => SubmissionSource::WebForm,
            },
        },
        None => SubmissionMetadata::default(),
    };

    Ok(Submission {
        id,
        submitter: Submitter {
            name: f.string("name")?,
            surname: f.string("surname")?,
            phone: f.string("phone")?,
        },
        dni_image_url: f.string("dni_image_url")?,
        moderation: Moderation {
            status,
            created_at: f.timestamp("created_at")?,
            updated_at: f.timestamp("updated_at")?,
            approved_at: f.optional_timestamp("approved_at"),
            approved_by: f.optional_string("approved_by"),
            admin_notes: f.optional_string("admin_notes"),
        },
        metadata,
        content,
    })
}

fn firestore_error(failure: ApiFailure) -> PortError {
    let code = match failure.status {
        StatusCode::NOT_FOUND => return PortError::NotFound(failure.message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "firestore/permission-denied",
        StatusCode::TOO_MANY_REQUESTS => "firestore/resource-exhausted",
        StatusCode::SERVICE_UNAVAILABLE => "firestore/unavailable",
        StatusCode::GATEWAY_TIMEOUT => "firestore/deadline-exceeded",
        _ => {
            let reason = failure
                .reason
                .as_deref()
                .unwrap_or("unknown")
                .to_lowercase()
                .replace('_', "-");
            return PortError::platform(format!("firestore/{}", reason), failure.message);
        }
    };
    PortError::platform(code, failure.message)
}

//=========================================================================================
// DocumentStore Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for FirestoreStore {
    #[instrument(skip(self, submission, moderation), fields(kind = %submission.kind()))]
    async fn insert(&self, submission: &NewSubmission, moderation: &Moderation) -> PortResult<String> {
        let url = format!("{}/{}", self.documents_url, submission.kind().collection());
        let body = json!({ "fields": encode_new(submission, moderation) });
        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(transport_error)?;
        let record: DocumentRecord = check(response)
            .await
            .map_err(firestore_error)?
            .json()
            .await
            .map_err(transport_error)?;
        let id = record.name.rsplit('/').next().unwrap_or_default().to_string();
        debug!(id = %id, "Document created");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, kind: SubmissionKind, id: &str) -> PortResult<Option<Submission>> {
        let response = self
            .authorize(self.client.get(self.document_url(kind, id)))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record: DocumentRecord = check(response)
            .await
            .map_err(firestore_error)?
            .json()
            .await
            .map_err(transport_error)?;
        decode(kind, &record).map(Some)
    }

    #[instrument(skip(self))]
    async fn query(&self, kind: SubmissionKind, query: StatusQuery) -> PortResult<Vec<Submission>> {
        let mut structured = json!({
            "from": [{ "collectionId": kind.collection() }],
            "where": { "fieldFilter": {
                "field": { "fieldPath": "status" },
                "op": "EQUAL",
                "value": string_value(query.status.as_str()),
            }},
            "orderBy": [{ "field": { "fieldPath": "created_at" }, "direction": "DESCENDING" }],
        });
        if let Some(limit) = query.limit {
            structured["limit"] = json!(limit);
        }

        let response = self
            .authorize(
                self.client
                    .post(format!("{}:runQuery", self.documents_url))
                    .json(&json!({ "structuredQuery": structured })),
            )
            .send()
            .await
            .map_err(transport_error)?;
        let rows: Vec<QueryRow> = check(response)
            .await
            .map_err(firestore_error)?
            .json()
            .await
            .map_err(transport_error)?;

        rows.iter()
            .filter_map(|row| row.document.as_ref())
            .map(|record| decode(kind, record))
            .collect()
    }

    #[instrument(skip(self, change), fields(status = %change.status))]
    async fn update_status(&self, kind: SubmissionKind, id: &str, change: &StatusChange) -> PortResult<()> {
        let (fields, mask) = encode_change(change);
        let mut params: Vec<(&str, &str)> = mask.iter().map(|f| ("updateMask.fieldPaths", *f)).collect();
        params.push(("currentDocument.exists", "true"));

        let response = self
            .authorize(
                self.client
                    .patch(self.document_url(kind, id))
                    .query(&params)
                    .json(&json!({ "fields": fields })),
            )
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await.map_err(firestore_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relato() -> (NewSubmission, Moderation) {
        let now = DateTime::parse_from_rfc3339("2025-04-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let new = NewSubmission {
            submitter: Submitter {
                name: "Carlos".into(),
                surname: "Benítez".into(),
                phone: "2915551234".into(),
            },
            dni_image_url: "https://cdn.test/relatos/dni/1.jpg".into(),
            metadata: SubmissionMetadata {
                ip_address: Some("10.0.0.7".into()),
                user_agent: None,
                source: SubmissionSource::WebForm,
            },
            content: SubmissionContent::Relato {
                title: "Guardia en Darwin".into(),
                content: "Texto".into(),
                banner_image_url: "https://cdn.test/relatos/banners/1.jpg".into(),
            },
        };
        (new, Moderation::pending(now))
    }

    #[test]
    fn encoded_documents_decode_back_to_submissions() {
        let (new, moderation) = relato();
        let record = DocumentRecord {
            name: "projects/p/databases/(default)/documents/relatos/abc123".into(),
            fields: encode_new(&new, &moderation),
        };
        let decoded = decode(SubmissionKind::Relatos, &record).unwrap();
        assert_eq!(decoded.id, "abc123");
        assert_eq!(decoded.submitter, new.submitter);
        assert_eq!(decoded.content, new.content);
        assert_eq!(decoded.metadata, new.metadata);
        assert_eq!(decoded.moderation, moderation);
    }

    #[test]
    fn rejection_mask_covers_notes_but_not_approval_time() {
        let change = StatusChange::reject("admin-1", "Faltan datos", Utc::now());
        let (fields, mask) = encode_change(&change);
        assert_eq!(mask, vec!["status", "updated_at", "approved_by", "admin_notes"]);
        assert_eq!(fields["status"], json!({ "stringValue": "rejected" }));
        assert!(!fields.contains_key("approved_at"));
    }

    #[test]
    fn documents_missing_required_fields_are_reported() {
        let record = DocumentRecord {
            name: "projects/p/databases/(default)/documents/portal-memoria/x".into(),
            fields: Map::new(),
        };
        let err = decode(SubmissionKind::PortalMemoria, &record).unwrap_err();
        assert_eq!(err.code(), "unknown-error");
    }

    #[test]
    fn http_failures_map_to_firestore_codes() {
        let failure = |status, reason: Option<&str>| ApiFailure {
            status,
            message: "boom".into(),
            reason: reason.map(str::to_string),
        };
        assert_eq!(
            firestore_error(failure(StatusCode::SERVICE_UNAVAILABLE, None)).code(),
            "firestore/unavailable"
        );
        assert_eq!(
            firestore_error(failure(StatusCode::FORBIDDEN, Some("PERMISSION_DENIED"))).code(),
            "firestore/permission-denied"
        );
        assert_eq!(
            firestore_error(failure(StatusCode::CONFLICT, Some("FAILED_PRECONDITION"))).code(),
            "firestore/failed-precondition"
        );
        assert!(matches!(
            firestore_error(failure(StatusCode::NOT_FOUND, None)),
            PortError::NotFound(_)
        ));
    }
}
