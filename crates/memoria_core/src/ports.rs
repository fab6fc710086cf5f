//! crates/memoria_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the hosted platform the portal
//! runs on. These traits form the boundary of the hexagonal architecture: the
//! core never talks to a document database, object storage or identity
//! provider directly, only to these ports.

use async_trait::async_trait;

use crate::domain::{
    ImageFile, Moderation, NewSubmission, ProviderUser, StatusChange, Submission, SubmissionKind,
    SubmissionStatus, TokenClaims,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the platform (HTTP, SDK codes).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// An error the platform reported with its own code (e.g. `storage/quota-exceeded`).
    #[error("Platform error [{code}]: {message}")]
    Platform { code: String, message: String },
}

impl PortError {
    pub fn platform(code: impl Into<String>, message: impl Into<String>) -> Self {
        PortError::Platform {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The error code used to look up the user-facing message.
    pub fn code(&self) -> &str {
        match self {
            PortError::NotFound(_) => "not-found",
            PortError::Unauthorized => "permission-denied",
            PortError::Network(_) => "network-error",
            PortError::Timeout(_) => "timeout",
            PortError::Platform { code, .. } => code,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Queries
//=========================================================================================

/// An equality filter on `status`, ordered by `created_at` descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusQuery {
    pub status: SubmissionStatus,
    pub limit: Option<usize>,
}

impl StatusQuery {
    pub fn new(status: SubmissionStatus) -> Self {
        Self { status, limit: None }
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists a new submission and returns the id the store assigned.
    async fn insert(&self, submission: &NewSubmission, moderation: &Moderation) -> PortResult<String>;

    /// Point lookup. `Ok(None)` when the document does not exist.
    async fn get(&self, kind: SubmissionKind, id: &str) -> PortResult<Option<Submission>>;

    /// Documents matching `query.status`, newest first, capped by `query.limit`.
    async fn query(&self, kind: SubmissionKind, query: StatusQuery) -> PortResult<Vec<Submission>>;

    /// Applies a moderation decision to an existing document.
    async fn update_status(&self, kind: SubmissionKind, id: &str, change: &StatusChange) -> PortResult<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads a file under `path` and returns a durable download URL.
    async fn upload(&self, path: &str, file: &ImageFile) -> PortResult<String>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Email/password sign-in.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<ProviderUser>;

    /// Reads the claims of the user's ID token, refreshing it first when asked to.
    async fn id_token_claims(&self, user: &ProviderUser, force_refresh: bool) -> PortResult<TokenClaims>;

    /// Ends the user's session with the provider.
    async fn sign_out(&self, user: &ProviderUser) -> PortResult<()>;
}
