//! services/api/src/web/admin.rs
//!
//! Moderation endpoints. Every route here sits behind `require_admin`, so
//! handlers can rely on the `AuthUser` extension being present.

use std::sync::Arc;

use axum::{
    extract::{rejection::PathRejection, Extension, Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use memoria_core::moderation::KindStats;
use memoria_core::validation::sanitize_string;
use memoria_core::{
    AuthUser, FieldErrors, ModerationStats, PlatformError, Submission, SubmissionContent,
    SubmissionKind, SubmissionStatus,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MetadataView {
    pub submission_source: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A submission with everything a moderator needs, contact details included.
#[derive(Serialize, ToSchema)]
pub struct AdminSubmission {
    pub id: String,
    /// `relatos` or `portal-memoria`.
    pub kind: String,
    pub status: String,
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub dni_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub admin_notes: Option<String>,
    pub metadata: MetadataView,
}

impl From<Submission> for AdminSubmission {
    fn from(s: Submission) -> Self {
        let kind = s.kind().to_string();
        let (title, content, banner_image_url, description, image_url) = match s.content {
            SubmissionContent::Relato {
                title,
                content,
                banner_image_url,
            } => (Some(title), Some(content), Some(banner_image_url), None, None),
            SubmissionContent::PortalMemoria {
                description,
                image_url,
            } => (None, None, None, Some(description), Some(image_url)),
        };
        Self {
            id: s.id,
            kind,
            status: s.moderation.status.to_string(),
            name: s.submitter.name,
            surname: s.submitter.surname,
            phone: s.submitter.phone,
            dni_image_url: s.dni_image_url,
            title,
            content,
            banner_image_url,
            description,
            image_url,
            created_at: s.moderation.created_at,
            updated_at: s.moderation.updated_at,
            approved_at: s.moderation.approved_at,
            approved_by: s.moderation.approved_by,
            admin_notes: s.moderation.admin_notes,
            metadata: MetadataView {
                submission_source: s.metadata.source.as_str().to_string(),
                ip_address: s.metadata.ip_address,
                user_agent: s.metadata.user_agent,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct KindStatsView {
    pub pending: usize,
    pub approved: usize,
}

impl From<KindStats> for KindStatsView {
    fn from(stats: KindStats) -> Self {
        Self {
            pending: stats.pending,
            approved: stats.approved,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StatsView {
    pub relatos: KindStatsView,
    pub portal_memoria: KindStatsView,
}

impl From<ModerationStats> for StatsView {
    fn from(stats: ModerationStats) -> Self {
        Self {
            relatos: stats.relatos.into(),
            portal_memoria: stats.portal_memoria.into(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RejectRequest {
    /// Reason shown to other moderators. Required.
    #[serde(default)]
    pub notes: String,
}

#[derive(Serialize, ToSchema)]
pub struct ModerationResult {
    pub id: String,
    pub status: String,
}

impl ModerationResult {
    fn new(id: String, status: SubmissionStatus) -> Self {
        Self {
            id,
            status: status.to_string(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Pending and approved counts per collection.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Dashboard counters", body = StatsView),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.submissions.stats().await?;
    Ok(Json(StatsView::from(stats)))
}

/// Submissions awaiting a decision, newest first.
#[utoipa::path(
    get,
    path = "/admin/{kind}/pending",
    params(("kind" = String, Path, description = "relatos | portal-memoria")),
    responses(
        (status = 200, description = "Pending submissions", body = [AdminSubmission]),
        (status = 401, description = "No active session", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn pending_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<SubmissionKind>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(kind) = path?;
    let pending = state.submissions.list_pending(kind).await?;
    let items: Vec<AdminSubmission> = pending.into_iter().map(AdminSubmission::from).collect();
    Ok(Json(items))
}

/// A submission in any status.
#[utoipa::path(
    get,
    path = "/admin/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "relatos | portal-memoria"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "The submission", body = AdminSubmission),
        (status = 404, description = "Unknown id", body = ErrorBody)
    )
)]
pub async fn detail_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(SubmissionKind, String)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((kind, id)) = path?;
    let submission = state
        .submissions
        .get_by_id(&id, kind)
        .await?
        .ok_or_else(|| PlatformError::new("not-found", format!("{}/{} does not exist", kind, id)))?;
    Ok(Json(AdminSubmission::from(submission)))
}

/// Publish a pending submission.
#[utoipa::path(
    post,
    path = "/admin/{kind}/{id}/approve",
    params(
        ("kind" = String, Path, description = "relatos | portal-memoria"),
        ("id" = String, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Approved", body = ModerationResult),
        (status = 404, description = "Unknown id", body = ErrorBody),
        (status = 409, description = "Already approved or rejected", body = ErrorBody)
    )
)]
pub async fn approve_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    path: Result<Path<(SubmissionKind, String)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((kind, id)) = path?;
    state.submissions.approve(&id, kind, &admin.uid).await?;
    info!(kind = %kind, id = %id, admin = %admin.uid, "Submission approved");
    Ok(Json(ModerationResult::new(id, SubmissionStatus::Approved)))
}

/// Reject a pending submission with a reason.
#[utoipa::path(
    post,
    path = "/admin/{kind}/{id}/reject",
    params(
        ("kind" = String, Path, description = "relatos | portal-memoria"),
        ("id" = String, Path, description = "Document id")
    ),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = ModerationResult),
        (status = 404, description = "Unknown id", body = ErrorBody),
        (status = 409, description = "Already approved or rejected", body = ErrorBody),
        (status = 422, description = "Missing reason", body = ErrorBody)
    )
)]
pub async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    path: Result<Path<(SubmissionKind, String)>, PathRejection>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((kind, id)) = path?;
    let notes = sanitize_string(&req.notes);
    if notes.is_empty() {
        let mut errors = FieldErrors::new();
        errors.add("notes", "Por favor, proporciona una razón para el rechazo.");
        return Err(errors.into());
    }
    state.submissions.reject(&id, kind, &admin.uid, &notes).await?;
    info!(kind = %kind, id = %id, admin = %admin.uid, "Submission rejected");
    Ok(Json(ModerationResult::new(id, SubmissionStatus::Rejected)))
}
