//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public REST API (approved listings and
//! the two submission forms) and the master definition for the OpenAPI
//! specification.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use memoria_core::{
    ImageFile, Page, PageRequest, PlatformError, PortalMemoriaForm, RelatoForm, Submission,
    SubmissionContent, SubmissionKind, SubmissionMetadata, SubmissionSource, SubmissionStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::error::{ApiError, ErrorBody};
use crate::web::admin;
use crate::web::auth;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_relatos_handler,
        get_relato_handler,
        submit_relato_handler,
        list_portal_memoria_handler,
        get_portal_memoria_handler,
        submit_portal_memoria_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::session_handler,
        admin::stats_handler,
        admin::pending_handler,
        admin::detail_handler,
        admin::approve_handler,
        admin::reject_handler,
    ),
    components(
        schemas(
            PublicSubmission,
            SubmissionPage,
            SubmissionCreated,
            ErrorBody,
            auth::LoginRequest,
            auth::SessionUser,
            admin::AdminSubmission,
            admin::MetadataView,
            admin::StatsView,
            admin::KindStatsView,
            admin::RejectRequest,
            admin::ModerationResult,
        )
    ),
    tags(
        (name = "Portal de la Memoria API", description = "Relatos and portal de la memoria submissions, with moderation.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// An approved submission as shown to visitors. Contact details and the
/// DNI image stay private.
#[derive(Serialize, ToSchema)]
pub struct PublicSubmission {
    pub id: String,
    pub name: String,
    pub surname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Markdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<Submission> for PublicSubmission {
    fn from(s: Submission) -> Self {
        let mut view = Self {
            id: s.id,
            name: s.submitter.name,
            surname: s.submitter.surname,
            title: None,
            content: None,
            banner_image_url: None,
            description: None,
            image_url: None,
            created_at: s.moderation.created_at,
            approved_at: s.moderation.approved_at,
        };
        match s.content {
            SubmissionContent::Relato {
                title,
                content,
                banner_image_url,
            } => {
                view.title = Some(title);
                view.content = Some(content);
                view.banner_image_url = Some(banner_image_url);
            }
            SubmissionContent::PortalMemoria {
                description,
                image_url,
            } => {
                view.description = Some(description);
                view.image_url = Some(image_url);
            }
        }
        view
    }
}

#[derive(Serialize, ToSchema)]
pub struct SubmissionPage {
    pub items: Vec<PublicSubmission>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl From<Page<Submission>> for SubmissionPage {
    fn from(page: Page<Submission>) -> Self {
        let page = page.map(PublicSubmission::from);
        Self {
            items: page.items,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages,
        }
    }
}

/// The response payload sent after a form was accepted for moderation.
#[derive(Serialize, ToSchema)]
pub struct SubmissionCreated {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 1-based page number (default 1).
    pub page: Option<usize>,
    /// Items per page, 1-100 (default 12).
    pub per_page: Option<usize>,
    /// Case-insensitive search over names and text.
    pub q: Option<String>,
}

//=========================================================================================
// Shared Handler Logic
//=========================================================================================

async fn list_approved(
    state: &AppState,
    kind: SubmissionKind,
    query: ListQuery,
) -> Result<Json<SubmissionPage>, ApiError> {
    let request = PageRequest::parse(query.page, query.per_page, query.q.as_deref())?;
    let page = state.submissions.search_approved(kind, &request).await?;
    Ok(Json(page.into()))
}

async fn get_approved(
    state: &AppState,
    kind: SubmissionKind,
    id: &str,
) -> Result<Json<PublicSubmission>, ApiError> {
    match state.submissions.get_by_id(id, kind).await? {
        Some(s) if s.status() == SubmissionStatus::Approved => Ok(Json(s.into())),
        _ => Err(PlatformError::new("not-found", format!("{}/{} is not published", kind, id)).into()),
    }
}

/// Text parts and file parts of a submission form.
#[derive(Default)]
struct FormParts {
    text: HashMap<String, String>,
    files: HashMap<String, ImageFile>,
}

impl FormParts {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut parts = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            error!("Failed to read multipart data: {}", e);
            ApiError::BadRequest(e.body_text())
        })? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let mime_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    // Browsers send an empty part for a file input left blank.
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }
                    parts
                        .files
                        .insert(name, ImageFile::new(file_name, mime_type, data));
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    parts.text.insert(name, value);
                }
            }
        }
        Ok(parts)
    }

    fn text(&self, name: &str) -> String {
        self.text.get(name).cloned().unwrap_or_default()
    }

    fn file(&mut self, name: &str) -> Option<ImageFile> {
        self.files.remove(name)
    }
}

fn request_metadata(headers: &HeaderMap) -> SubmissionMetadata {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    SubmissionMetadata {
        ip_address: value("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| value("x-real-ip")),
        user_agent: value(header::USER_AGENT.as_str()),
        source: SubmissionSource::WebForm,
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List approved relatos, newest first.
#[utoipa::path(
    get,
    path = "/relatos",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of approved relatos", body = SubmissionPage),
        (status = 422, description = "Invalid paging parameters", body = ErrorBody)
    )
)]
pub async fn list_relatos_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    list_approved(&state, SubmissionKind::Relatos, query).await
}

/// Fetch one approved relato.
#[utoipa::path(
    get,
    path = "/relatos/{id}",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "The relato", body = PublicSubmission),
        (status = 404, description = "Unknown or unpublished", body = ErrorBody)
    )
)]
pub async fn get_relato_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    get_approved(&state, SubmissionKind::Relatos, &id).await
}

/// Submit a relato for moderation.
///
/// Multipart fields: `name`, `surname`, `phone`, `title`, `content`, and the
/// files `dni_image` and `banner_image`.
#[utoipa::path(
    post,
    path = "/relato/formulario",
    request_body(content_type = "multipart/form-data", description = "The relato form."),
    responses(
        (status = 201, description = "Relato received and pending approval", body = SubmissionCreated),
        (status = 422, description = "Invalid fields", body = ErrorBody),
        (status = 503, description = "Platform temporarily unavailable", body = ErrorBody)
    )
)]
pub async fn submit_relato_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut parts = FormParts::read(multipart).await?;
    let form = RelatoForm {
        name: parts.text("name"),
        surname: parts.text("surname"),
        phone: parts.text("phone"),
        title: parts.text("title"),
        content: parts.text("content"),
        dni_image: parts.file("dni_image"),
        banner_image: parts.file("banner_image"),
    };
    let id = state
        .workflow
        .submit_relato(form, request_metadata(&headers))
        .await?;
    info!(id = %id, "Relato submitted");
    Ok((
        StatusCode::CREATED,
        Json(SubmissionCreated {
            id,
            message: "Tu relato ha sido enviado y está pendiente de aprobación.".to_string(),
        }),
    ))
}

/// List approved portal de la memoria entries, newest first.
#[utoipa::path(
    get,
    path = "/portal-memoria",
    params(ListQuery),
    responses(
        (status = 200, description = "A page of approved entries", body = SubmissionPage),
        (status = 422, description = "Invalid paging parameters", body = ErrorBody)
    )
)]
pub async fn list_portal_memoria_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    list_approved(&state, SubmissionKind::PortalMemoria, query).await
}

#[utoipa::path(
    get,
    path = "/portal-memoria/{id}",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "The entry", body = PublicSubmission),
        (status = 404, description = "Unknown or unpublished", body = ErrorBody)
    )
)]
pub async fn get_portal_memoria_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    get_approved(&state, SubmissionKind::PortalMemoria, &id).await
}

/// Submit a portal de la memoria entry for moderation.
///
/// Multipart fields: `name`, `surname`, `phone`, `description`, and the
/// files `dni_image` and `image`.
#[utoipa::path(
    post,
    path = "/portal-memoria/formulario",
    request_body(content_type = "multipart/form-data", description = "The memorial entry form."),
    responses(
        (status = 201, description = "Entry received and pending approval", body = SubmissionCreated),
        (status = 422, description = "Invalid fields", body = ErrorBody),
        (status = 503, description = "Platform temporarily unavailable", body = ErrorBody)
    )
)]
pub async fn submit_portal_memoria_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut parts = FormParts::read(multipart).await?;
    let form = PortalMemoriaForm {
        name: parts.text("name"),
        surname: parts.text("surname"),
        phone: parts.text("phone"),
        description: parts.text("description"),
        dni_image: parts.file("dni_image"),
        image: parts.file("image"),
    };
    let id = state
        .workflow
        .submit_portal_memoria(form, request_metadata(&headers))
        .await?;
    info!(id = %id, "Portal de la memoria entry submitted");
    Ok((
        StatusCode::CREATED,
        Json(SubmissionCreated {
            id,
            message: "Tu entrada al portal de la memoria ha sido enviada y está pendiente de aprobación."
                .to_string(),
        }),
    ))
}

/// Whether an object path belongs to a DNI directory (`<collection>/dni/...`).
fn is_dni_path(path: &str) -> bool {
    path.split('/').any(|segment| segment == "dni")
}

/// Serves images held by the in-memory storage backend. DNI images are never
/// served here.
pub async fn media_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let not_found = || ApiError::from(PlatformError::from_code("storage/object-not-found"));
    if is_dni_path(&path) {
        return Err(not_found());
    }
    let media = state.media.as_ref().ok_or_else(not_found)?;
    let file = media.get(&path).await.ok_or_else(not_found)?;
    Ok(([(header::CONTENT_TYPE, file.mime_type)], file.bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn metadata_prefers_the_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Firefox"));
        let metadata = request_metadata(&headers);
        assert_eq!(metadata.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(metadata.user_agent.as_deref(), Some("Firefox"));
        assert_eq!(metadata.source, SubmissionSource::WebForm);
    }

    #[test]
    fn dni_directories_are_recognised() {
        assert!(is_dni_path("relatos/dni/1700000000000_ab12.jpg"));
        assert!(is_dni_path("portal-memoria/dni/x.png"));
        assert!(!is_dni_path("relatos/banners/x.jpg"));
        assert!(!is_dni_path("portal-memoria/images/dni.png"));
    }

    #[test]
    fn public_view_hides_contact_details() {
        let now = Utc::now();
        let submission = Submission {
            id: "r1".into(),
            submitter: memoria_core::Submitter {
                name: "Inés".into(),
                surname: "Vera".into(),
                phone: "2215550000".into(),
            },
            dni_image_url: "https://cdn.test/dni.jpg".into(),
            moderation: memoria_core::domain::Moderation::pending(now),
            metadata: SubmissionMetadata::default(),
            content: SubmissionContent::Relato {
                title: "Vuelta a casa".into(),
                content: "…".into(),
                banner_image_url: "https://cdn.test/b.jpg".into(),
            },
        };
        let json = serde_json::to_value(PublicSubmission::from(submission)).unwrap();
        assert_eq!(json["title"], "Vuelta a casa");
        assert!(json.get("phone").is_none());
        assert!(json.get("dni_image_url").is_none());
        assert!(json.get("description").is_none());
    }
}
