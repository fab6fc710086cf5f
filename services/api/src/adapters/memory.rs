//! services/api/src/adapters/memory.rs
//!
//! In-process implementations of every port, selected with
//! `PORTAL_BACKEND=memory` for local development and used by the
//! integration tests. Nothing survives a restart.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use memoria_core::domain::{
    ImageFile, Moderation, NewSubmission, ProviderUser, StatusChange, Submission, SubmissionKind,
    TokenClaims,
};
use memoria_core::ports::{
    DocumentStore, IdentityProvider, ObjectStorage, PortError, PortResult, StatusQuery,
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// Document Store
//=========================================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<SubmissionKind, Vec<Submission>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, submission: &NewSubmission, moderation: &Moderation) -> PortResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let document = Submission::from_new(id.clone(), submission.clone(), moderation.clone());
        self.documents
            .write()
            .await
            .entry(submission.kind())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn get(&self, kind: SubmissionKind, id: &str) -> PortResult<Option<Submission>> {
        Ok(self
            .documents
            .read()
            .await
            .get(&kind)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }

    async fn query(&self, kind: SubmissionKind, query: StatusQuery) -> PortResult<Vec<Submission>> {
        let documents = self.documents.read().await;
        let mut matching: Vec<Submission> = documents
            .get(&kind)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.status() == query.status)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Insertion order breaks ties between equal timestamps, newest first.
        matching.reverse();
        matching.sort_by(|a, b| b.moderation.created_at.cmp(&a.moderation.created_at));
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn update_status(&self, kind: SubmissionKind, id: &str, change: &StatusChange) -> PortResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&kind)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", kind, id)))?;
        document.moderation.apply(change);
        Ok(())
    }
}

//=========================================================================================
// Object Storage
//=========================================================================================

/// Keeps uploaded objects in memory and hands out URLs under `base_url`.
pub struct MemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, ImageFile>>,
}

impl MemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, path: &str) -> Option<ImageFile> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, path: &str, file: &ImageFile) -> PortResult<String> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), file.clone());
        Ok(format!("{}/{}", self.base_url, path))
    }
}

//=========================================================================================
// Identity Provider
//=========================================================================================

struct Account {
    uid: String,
    password: String,
    admin: bool,
}

/// Password accounts with an `admin` flag standing in for the custom claim.
#[derive(Default)]
pub struct MemoryIdentity {
    accounts: RwLock<HashMap<String, Account>>,
    /// ID tokens that have not been signed out.
    live_tokens: RwLock<HashSet<String>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account and returns its uid.
    pub async fn add_account(&self, email: &str, password: &str, admin: bool) -> String {
        let uid = Uuid::new_v4().simple().to_string();
        self.accounts.write().await.insert(
            email.to_lowercase(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
                admin,
            },
        );
        info!(email = %email, admin, "Memory account registered");
        uid
    }

    pub async fn set_admin(&self, email: &str, admin: bool) {
        if let Some(account) = self.accounts.write().await.get_mut(&email.to_lowercase()) {
            account.admin = admin;
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<ProviderUser> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&email.to_lowercase())
            .ok_or_else(|| PortError::platform("auth/user-not-found", email))?;
        if account.password != password {
            return Err(PortError::platform("auth/wrong-password", email));
        }

        let id_token = Uuid::new_v4().to_string();
        self.live_tokens.write().await.insert(id_token.clone());
        Ok(ProviderUser {
            uid: account.uid.clone(),
            email: Some(email.to_lowercase()),
            display_name: None,
            id_token,
            refresh_token: Some(Uuid::new_v4().to_string()),
        })
    }

    async fn id_token_claims(&self, user: &ProviderUser, _force_refresh: bool) -> PortResult<TokenClaims> {
        if !self.live_tokens.read().await.contains(&user.id_token) {
            return Err(PortError::platform("auth/user-token-expired", "token was signed out"));
        }
        let admin = self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.uid == user.uid)
            .map(|a| a.admin)
            .ok_or_else(|| PortError::platform("auth/user-not-found", user.uid.clone()))?;
        Ok(TokenClaims {
            admin,
            user: user.clone(),
        })
    }

    async fn sign_out(&self, user: &ProviderUser) -> PortResult<()> {
        self.live_tokens.write().await.remove(&user.id_token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use memoria_core::domain::{
        SubmissionContent, SubmissionMetadata, SubmissionStatus, Submitter,
    };

    fn entry(description: &str) -> NewSubmission {
        NewSubmission {
            submitter: Submitter {
                name: "Elsa".into(),
                surname: "Ruiz".into(),
                phone: "2964123456".into(),
            },
            dni_image_url: "http://localhost/media/dni.png".into(),
            metadata: SubmissionMetadata::default(),
            content: SubmissionContent::PortalMemoria {
                description: description.into(),
                image_url: "http://localhost/media/img.png".into(),
            },
        }
    }

    #[tokio::test]
    async fn queries_are_newest_first_and_limited() {
        let store = MemoryDocumentStore::new();
        let t0 = Utc::now();
        for (i, text) in ["primero", "segundo", "tercero"].iter().enumerate() {
            store
                .insert(&entry(text), &Moderation::pending(t0 + Duration::seconds(i as i64)))
                .await
                .unwrap();
        }

        let all = store
            .query(SubmissionKind::PortalMemoria, StatusQuery::new(SubmissionStatus::Pending))
            .await
            .unwrap();
        let order: Vec<_> = all
            .iter()
            .map(|s| match &s.content {
                SubmissionContent::PortalMemoria { description, .. } => description.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec!["tercero", "segundo", "primero"]);

        let limited = store
            .query(
                SubmissionKind::PortalMemoria,
                StatusQuery::new(SubmissionStatus::Pending).limit(Some(1)),
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert!(store
            .query(SubmissionKind::Relatos, StatusQuery::new(SubmissionStatus::Pending))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn signed_out_tokens_lose_their_claims() {
        let identity = MemoryIdentity::new();
        identity.add_account("Admin@Portal.ar", "secreta", true).await;

        let user = identity
            .sign_in_with_password("admin@portal.ar", "secreta")
            .await
            .unwrap();
        assert!(identity.id_token_claims(&user, true).await.unwrap().admin);

        identity.sign_out(&user).await.unwrap();
        let err = identity.id_token_claims(&user, true).await.unwrap_err();
        assert_eq!(err.code(), "auth/user-token-expired");
    }
}
