//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how it is wired from the
//! configuration.

use std::sync::Arc;

use memoria_core::ports::{DocumentStore, IdentityProvider, ObjectStorage};
use memoria_core::{AuthGate, SubmissionService, SubmissionWorkflow};
use tracing::info;

use crate::adapters::{
    http, FirebaseStorage, FirestoreStore, IdentityToolkit, MemoryDocumentStore, MemoryIdentity,
    MemoryObjectStorage,
};
use crate::config::{Backend, Config};
use crate::error::ApiError;
use crate::web::session::SessionStore;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub submissions: Arc<SubmissionService>,
    pub workflow: Arc<SubmissionWorkflow>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: SessionStore,
    /// Set with the memory backend, which serves uploaded images itself.
    pub media: Option<Arc<MemoryObjectStorage>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let submissions = Arc::new(SubmissionService::new(store));
        let workflow = Arc::new(SubmissionWorkflow::new(storage, submissions.clone()));
        Self {
            sessions: SessionStore::new(config.session_ttl),
            config,
            submissions,
            workflow,
            identity,
            media: None,
        }
    }

    pub fn with_media(mut self, media: Arc<MemoryObjectStorage>) -> Self {
        self.media = Some(media);
        self
    }

    /// Builds the adapters the configuration selects.
    pub async fn from_config(config: Arc<Config>) -> Result<Self, ApiError> {
        match config.backend {
            Backend::Memory => {
                let identity = Arc::new(MemoryIdentity::new());
                if let Some(admin) = &config.dev_admin {
                    identity.add_account(&admin.email, &admin.password, true).await;
                }
                let media = Arc::new(MemoryObjectStorage::new(format!(
                    "http://{}/media",
                    config.bind_address
                )));
                info!("Using in-memory backend");
                Ok(Self::new(
                    config.clone(),
                    Arc::new(MemoryDocumentStore::new()),
                    media.clone(),
                    identity,
                )
                .with_media(media))
            }
            Backend::Firebase => {
                let firebase = config
                    .firebase
                    .as_ref()
                    .ok_or_else(|| ApiError::Internal("Firebase settings are missing".to_string()))?;
                let client = http::client().map_err(|e| ApiError::Internal(e.to_string()))?;
                let token = config.service_token.clone();

                let (store, storage, identity) = match &config.emulators {
                    Some(emulators) => {
                        info!("Using Firebase emulators");
                        (
                            FirestoreStore::with_base_url(
                                client.clone(),
                                &emulators.firestore.base_url(),
                                &firebase.project_id,
                                token.clone(),
                            ),
                            FirebaseStorage::with_base_url(
                                client.clone(),
                                &emulators.storage.base_url(),
                                &firebase.storage_bucket,
                                token,
                            ),
                            IdentityToolkit::with_emulator(
                                client,
                                &firebase.api_key,
                                &emulators.auth.base_url(),
                            ),
                        )
                    }
                    None => (
                        FirestoreStore::new(client.clone(), &firebase.project_id, token.clone()),
                        FirebaseStorage::new(client.clone(), &firebase.storage_bucket, token),
                        IdentityToolkit::new(client, &firebase.api_key),
                    ),
                };
                info!(project = %firebase.project_id, "Using Firebase backend");
                Ok(Self::new(
                    config.clone(),
                    Arc::new(store),
                    Arc::new(storage),
                    Arc::new(identity),
                ))
            }
        }
    }

    /// A fresh gate for a browser that is about to sign in.
    pub fn new_gate(&self) -> Arc<AuthGate> {
        Arc::new(AuthGate::new(self.identity.clone()))
    }
}
