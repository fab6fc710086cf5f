//! crates/memoria_core/src/domain.rs
//!
//! Defines the pure, core data structures for the portal.
//! These structs are independent of any storage platform or wire format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Submission Kinds and Moderation Status
//=========================================================================================

/// The two logical collections a visitor can submit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionKind {
    /// Long-form narratives ("relatos").
    Relatos,
    /// Short memorial tributes ("portal de la memoria").
    PortalMemoria,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 2] = [SubmissionKind::Relatos, SubmissionKind::PortalMemoria];

    /// Name of the document collection backing this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            SubmissionKind::Relatos => "relatos",
            SubmissionKind::PortalMemoria => "portal-memoria",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for SubmissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relatos" => Ok(SubmissionKind::Relatos),
            "portal-memoria" => Ok(SubmissionKind::PortalMemoria),
            other => Err(format!("unknown submission kind '{}'", other)),
        }
    }
}

/// Moderation state of a submission.
///
/// `Pending` is the only non-terminal state: it may move to `Approved` or
/// `Rejected`, and nothing ever leaves those two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (SubmissionStatus::Pending, SubmissionStatus::Approved)
                | (SubmissionStatus::Pending, SubmissionStatus::Rejected)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            other => Err(format!("unknown submission status '{}'", other)),
        }
    }
}

//=========================================================================================
// Submissions
//=========================================================================================

/// Identity of the person submitting. Shared by both submission kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitter {
    pub name: String,
    pub surname: String,
    pub phone: String,
}

/// Where a submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionSource {
    #[default]
    WebForm,
    AdminUpload,
}

impl SubmissionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionSource::WebForm => "web_form",
            SubmissionSource::AdminUpload => "admin_upload",
        }
    }
}

/// Request metadata recorded alongside a submission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmissionMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub source: SubmissionSource,
}

/// The kind-specific part of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionContent {
    Relato {
        title: String,
        /// Markdown exported from the rich-text editor.
        content: String,
        banner_image_url: String,
    },
    PortalMemoria {
        description: String,
        image_url: String,
    },
}

impl SubmissionContent {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            SubmissionContent::Relato { .. } => SubmissionKind::Relatos,
            SubmissionContent::PortalMemoria { .. } => SubmissionKind::PortalMemoria,
        }
    }
}

/// Moderation bookkeeping of a stored submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moderation {
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub admin_notes: Option<String>,
}

impl Moderation {
    /// The moderation record every new submission starts with.
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: SubmissionStatus::Pending,
            created_at: now,
            updated_at: now,
            approved_at: None,
            approved_by: None,
            admin_notes: None,
        }
    }

    /// Applies a status change on top of this record.
    pub fn apply(&mut self, change: &StatusChange) {
        self.status = change.status;
        self.updated_at = change.updated_at;
        self.approved_by = Some(change.approved_by.clone());
        if change.approved_at.is_some() {
            self.approved_at = change.approved_at;
        }
        if change.admin_notes.is_some() {
            self.admin_notes = change.admin_notes.clone();
        }
    }
}

/// Data for creating a new submission (before the store assigns an id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub submitter: Submitter,
    pub dni_image_url: String,
    pub metadata: SubmissionMetadata,
    pub content: SubmissionContent,
}

impl NewSubmission {
    pub fn kind(&self) -> SubmissionKind {
        self.content.kind()
    }
}

/// A stored submission of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub submitter: Submitter,
    pub dni_image_url: String,
    pub moderation: Moderation,
    pub metadata: SubmissionMetadata,
    pub content: SubmissionContent,
}

impl Submission {
    pub fn from_new(id: String, new: NewSubmission, moderation: Moderation) -> Self {
        Self {
            id,
            submitter: new.submitter,
            dni_image_url: new.dni_image_url,
            moderation,
            metadata: new.metadata,
            content: new.content,
        }
    }

    pub fn kind(&self) -> SubmissionKind {
        self.content.kind()
    }

    pub fn status(&self) -> SubmissionStatus {
        self.moderation.status
    }

    /// Case-insensitive substring match over the publicly searchable fields.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        if hit(&self.submitter.name) || hit(&self.submitter.surname) {
            return true;
        }
        match &self.content {
            SubmissionContent::Relato { title, content, .. } => hit(title) || hit(content),
            SubmissionContent::PortalMemoria { description, .. } => hit(description),
        }
    }
}

/// A moderation decision, as written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: SubmissionStatus,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: String,
    pub admin_notes: Option<String>,
}

impl StatusChange {
    pub fn approve(admin_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: SubmissionStatus::Approved,
            updated_at: now,
            approved_at: Some(now),
            approved_by: admin_id.to_string(),
            admin_notes: None,
        }
    }

    pub fn reject(admin_id: &str, notes: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: SubmissionStatus::Rejected,
            updated_at: now,
            approved_at: None,
            approved_by: admin_id.to_string(),
            admin_notes: Some(notes.to_string()),
        }
    }
}

//=========================================================================================
// Files and Uploads
//=========================================================================================

/// An image file handed in by a visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// One of the three independent upload slots of a submission form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSlot {
    Dni,
    Banner,
    Image,
}

/// Progress of a single upload slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UploadState {
    pub is_uploading: bool,
    pub progress: u8,
    pub url: Option<String>,
    pub error: Option<String>,
}

//=========================================================================================
// Authentication
//=========================================================================================

/// A user as reported by the identity provider, with the tokens of its session.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
}

// Tokens stay out of logs.
impl fmt::Debug for ProviderUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderUser")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Claims carried by a (possibly refreshed) ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub admin: bool,
    /// The user with up-to-date tokens, if the lookup refreshed them.
    pub user: ProviderUser,
}

/// The authenticated session the rest of the application sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn from_provider(user: &ProviderUser, is_admin: bool) -> Self {
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            is_admin,
            display_name: user.display_name.clone(),
        }
    }
}
