//! Test doubles for the platform ports, with failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{
    ImageFile, Moderation, NewSubmission, ProviderUser, StatusChange, Submission, SubmissionKind,
    TokenClaims,
};
use crate::ports::{
    DocumentStore, IdentityProvider, ObjectStorage, PortError, PortResult, StatusQuery,
};

#[derive(Default)]
pub struct FakeStore {
    docs: Mutex<HashMap<(SubmissionKind, String), Submission>>,
    next_id: Mutex<u64>,
    pub query_failures: Mutex<VecDeque<PortError>>,
    pub update_calls: Mutex<u32>,
}

impl FakeStore {
    pub fn fail_next_query(&self, err: PortError) {
        self.query_failures.lock().unwrap().push_back(err);
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn insert(&self, submission: &NewSubmission, moderation: &Moderation) -> PortResult<String> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("doc-{}", next)
        };
        let doc = Submission::from_new(id.clone(), submission.clone(), moderation.clone());
        self.docs
            .lock()
            .unwrap()
            .insert((submission.kind(), id.clone()), doc);
        Ok(id)
    }

    async fn get(&self, kind: SubmissionKind, id: &str) -> PortResult<Option<Submission>> {
        Ok(self.docs.lock().unwrap().get(&(kind, id.to_string())).cloned())
    }

    async fn query(&self, kind: SubmissionKind, query: StatusQuery) -> PortResult<Vec<Submission>> {
        if let Some(err) = self.query_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut docs: Vec<Submission> = self
            .docs
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.kind() == kind && d.status() == query.status)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.moderation.created_at.cmp(&a.moderation.created_at));
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn update_status(&self, kind: SubmissionKind, id: &str, change: &StatusChange) -> PortResult<()> {
        *self.update_calls.lock().unwrap() += 1;
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| PortError::NotFound(id.to_string()))?;
        doc.moderation.apply(change);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub failures: Mutex<VecDeque<PortError>>,
    pub uploaded: Mutex<Vec<String>>,
    pub hold: Option<Arc<Notify>>,
}

impl FakeStorage {
    pub fn held(gate: Arc<Notify>) -> Self {
        Self {
            hold: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, err: PortError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn paths(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, path: &str, _file: &ImageFile) -> PortResult<String> {
        if let Some(gate) = &self.hold {
            gate.notified().await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.uploaded.lock().unwrap().push(path.to_string());
        Ok(format!("https://storage.test/{}", path))
    }
}

/// Accounts are `email -> (password, uid, admin)`.
#[derive(Default)]
pub struct FakeIdentity {
    pub accounts: Mutex<HashMap<String, (String, String, bool)>>,
    pub signed_out: Mutex<Vec<String>>,
    pub claims_failures: Mutex<VecDeque<PortError>>,
}

impl FakeIdentity {
    pub fn with_account(self, email: &str, password: &str, uid: &str, admin: bool) -> Self {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            (password.to_string(), uid.to_string(), admin),
        );
        self
    }

    pub fn set_admin(&self, uid: &str, admin: bool) {
        for account in self.accounts.lock().unwrap().values_mut() {
            if account.1 == uid {
                account.2 = admin;
            }
        }
    }

    pub fn user(uid: &str, email: &str) -> ProviderUser {
        ProviderUser {
            uid: uid.to_string(),
            email: Some(email.to_string()),
            display_name: None,
            id_token: format!("token-{}", uid),
            refresh_token: Some(format!("refresh-{}", uid)),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<ProviderUser> {
        let accounts = self.accounts.lock().unwrap();
        let (expected, uid, _) = accounts
            .get(email)
            .ok_or_else(|| PortError::platform("auth/user-not-found", email))?;
        if expected != password {
            return Err(PortError::platform("auth/wrong-password", email));
        }
        Ok(FakeIdentity::user(uid, email))
    }

    async fn id_token_claims(&self, user: &ProviderUser, _force_refresh: bool) -> PortResult<TokenClaims> {
        if let Some(err) = self.claims_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let admin = self
            .accounts
            .lock()
            .unwrap()
            .values()
            .any(|(_, uid, admin)| uid == &user.uid && *admin);
        Ok(TokenClaims {
            admin,
            user: user.clone(),
        })
    }

    async fn sign_out(&self, user: &ProviderUser) -> PortResult<()> {
        self.signed_out.lock().unwrap().push(user.uid.clone());
        Ok(())
    }
}
