pub mod auth;
pub mod domain;
pub mod errors;
pub mod image_processing;
pub mod moderation;
pub mod ports;
pub mod retry;
pub mod submission;
pub mod upload;
pub mod validation;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, AuthGate, AuthState, SessionEvent};
pub use domain::{
    AuthUser, ImageFile, ImageSlot, NewSubmission, ProviderUser, Submission, SubmissionContent,
    SubmissionKind, SubmissionMetadata, SubmissionSource, SubmissionStatus, Submitter, UploadState,
};
pub use errors::PlatformError;
pub use moderation::{ModerationStats, Page, SubmissionService};
pub use ports::{DocumentStore, IdentityProvider, ObjectStorage, PortError, PortResult};
pub use retry::RetryPolicy;
pub use submission::{SubmissionError, SubmissionWorkflow};
pub use upload::{UploadCoordinator, UploadStates};
pub use validation::{FieldErrors, PageRequest, PortalMemoriaForm, RelatoForm};
