//! crates/memoria_core/src/moderation.rs
//!
//! The document service: creates submissions, serves the pending queue to
//! moderators and the approved listings to the public, and guards the
//! pending -> approved / rejected state machine.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::{
    Moderation, NewSubmission, StatusChange, Submission, SubmissionKind, SubmissionStatus,
};
use crate::errors::PlatformError;
use crate::ports::{DocumentStore, StatusQuery};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::validation::PageRequest;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Slices `all` to the requested page.
    pub fn slice(all: Vec<T>, request: &PageRequest) -> Self {
        let total = all.len();
        let total_pages = total.div_ceil(request.per_page);
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.per_page)
            .collect();
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub pending: usize,
    pub approved: usize,
}

/// Counters shown on the moderation dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModerationStats {
    pub relatos: KindStats,
    pub portal_memoria: KindStats,
}

pub struct SubmissionService {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stores a new submission as `pending` and returns its id.
    #[instrument(skip(self, new), fields(kind = %new.kind()))]
    pub async fn create(&self, new: NewSubmission) -> Result<String, PlatformError> {
        let moderation = Moderation::pending(Utc::now());
        let id = self.store.insert(&new, &moderation).await?;
        info!(id = %id, "Submission stored as pending");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn list_pending(&self, kind: SubmissionKind) -> Result<Vec<Submission>, PlatformError> {
        Ok(self
            .store
            .query(kind, StatusQuery::new(SubmissionStatus::Pending))
            .await?)
    }

    /// Approved submissions, newest first. A limit of zero means no limit.
    #[instrument(skip(self))]
    pub async fn list_approved(
        &self,
        kind: SubmissionKind,
        limit: Option<usize>,
    ) -> Result<Vec<Submission>, PlatformError> {
        let query = StatusQuery::new(SubmissionStatus::Approved).limit(limit.filter(|&n| n > 0));
        retry_with_backoff(self.retry, || self.store.query(kind, query)).await
    }

    /// Approved submissions matching the request's search term, paginated.
    #[instrument(skip(self, request), fields(page = request.page))]
    pub async fn search_approved(
        &self,
        kind: SubmissionKind,
        request: &PageRequest,
    ) -> Result<Page<Submission>, PlatformError> {
        let mut approved = self.list_approved(kind, None).await?;
        if let Some(term) = &request.search {
            approved.retain(|s| s.matches(term));
        }
        Ok(Page::slice(approved, request))
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str, kind: SubmissionKind) -> Result<Option<Submission>, PlatformError> {
        retry_with_backoff(self.retry, || self.store.get(kind, id)).await
    }

    #[instrument(skip(self))]
    pub async fn approve(&self, id: &str, kind: SubmissionKind, admin_id: &str) -> Result<(), PlatformError> {
        self.transition(id, kind, StatusChange::approve(admin_id, Utc::now()))
            .await
    }

    #[instrument(skip(self, notes))]
    pub async fn reject(
        &self,
        id: &str,
        kind: SubmissionKind,
        admin_id: &str,
        notes: &str,
    ) -> Result<(), PlatformError> {
        self.transition(id, kind, StatusChange::reject(admin_id, notes, Utc::now()))
            .await
    }

    /// Pending and approved counts for every kind.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<ModerationStats, PlatformError> {
        let (relatos, portal_memoria) = futures::try_join!(
            self.kind_stats(SubmissionKind::Relatos),
            self.kind_stats(SubmissionKind::PortalMemoria)
        )?;
        Ok(ModerationStats {
            relatos,
            portal_memoria,
        })
    }

    async fn kind_stats(&self, kind: SubmissionKind) -> Result<KindStats, PlatformError> {
        let (pending, approved) = futures::try_join!(
            self.list_pending(kind),
            self.list_approved(kind, None)
        )?;
        Ok(KindStats {
            pending: pending.len(),
            approved: approved.len(),
        })
    }

    // Read-then-write: two moderators deciding the same entry at once both
    // pass the guard and the later write wins.
    async fn transition(&self, id: &str, kind: SubmissionKind, change: StatusChange) -> Result<(), PlatformError> {
        let current = self
            .store
            .get(kind, id)
            .await?
            .ok_or_else(|| PlatformError::new("not-found", format!("{}/{} does not exist", kind, id)))?;

        if !current.status().can_transition_to(change.status) {
            warn!(from = %current.status(), to = %change.status, "Refused status transition");
            return Err(PlatformError::new(
                "invalid-transition",
                format!("{} -> {}", current.status(), change.status),
            ));
        }

        self.store.update_status(kind, id, &change).await?;
        info!(status = %change.status, by = %change.approved_by, "Submission moderated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SubmissionContent, SubmissionMetadata, Submitter};
    use crate::ports::PortError;
    use crate::testing::FakeStore;

    fn relato(title: &str) -> NewSubmission {
        NewSubmission {
            submitter: Submitter {
                name: "Ana".into(),
                surname: "Pérez".into(),
                phone: "2215551234".into(),
            },
            dni_image_url: "https://storage.test/relatos/dni/a.jpg".into(),
            metadata: SubmissionMetadata::default(),
            content: SubmissionContent::Relato {
                title: title.into(),
                content: "c".repeat(60),
                banner_image_url: "https://storage.test/relatos/banners/b.jpg".into(),
            },
        }
    }

    fn service(store: Arc<FakeStore>) -> SubmissionService {
        SubmissionService::new(store).with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn new_submissions_start_pending() {
        let store = Arc::new(FakeStore::default());
        let service = service(store);
        let id = service.create(relato("Malvinas 1982")).await.unwrap();

        let stored = service
            .get_by_id(&id, SubmissionKind::Relatos)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), SubmissionStatus::Pending);
        assert_eq!(stored.moderation.created_at, stored.moderation.updated_at);
        assert_eq!(stored.moderation.approved_by, None);
    }

    #[tokio::test]
    async fn approving_moves_entry_from_pending_to_approved() {
        let store = Arc::new(FakeStore::default());
        let service = service(store);
        let id = service.create(relato("El regreso")).await.unwrap();
        let other = service.create(relato("La partida")).await.unwrap();

        service
            .approve(&id, SubmissionKind::Relatos, "admin-1")
            .await
            .unwrap();

        let stored = service
            .get_by_id(&id, SubmissionKind::Relatos)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), SubmissionStatus::Approved);
        assert_eq!(stored.moderation.approved_by.as_deref(), Some("admin-1"));
        assert!(stored.moderation.approved_at.is_some());

        let pending = service.list_pending(SubmissionKind::Relatos).await.unwrap();
        assert_eq!(pending.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec![other.as_str()]);
        let approved = service
            .list_approved(SubmissionKind::Relatos, Some(0))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
    }

    #[tokio::test]
    async fn rejection_records_notes_and_is_terminal() {
        let store = Arc::new(FakeStore::default());
        let service = service(store.clone());
        let id = service.create(relato("Sin permiso")).await.unwrap();

        service
            .reject(&id, SubmissionKind::Relatos, "admin-2", "Datos incompletos")
            .await
            .unwrap();
        let stored = service
            .get_by_id(&id, SubmissionKind::Relatos)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), SubmissionStatus::Rejected);
        assert_eq!(stored.moderation.admin_notes.as_deref(), Some("Datos incompletos"));
        assert_eq!(stored.moderation.approved_at, None);

        let err = service
            .approve(&id, SubmissionKind::Relatos, "admin-1")
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid-transition");
        assert_eq!(*store.update_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn moderating_a_missing_entry_is_not_found() {
        let service = service(Arc::new(FakeStore::default()));
        let err = service
            .approve("nope", SubmissionKind::PortalMemoria, "admin-1")
            .await
            .unwrap_err();
        assert_eq!(err.code, "not-found");
        assert_eq!(err.user_message, "El registro solicitado no existe.");
    }

    #[tokio::test]
    async fn search_filters_and_paginates_approved_entries() {
        let store = Arc::new(FakeStore::default());
        let service = service(store);
        for i in 0..5 {
            let title = if i % 2 == 0 { format!("Islas {}", i) } else { format!("Continente {}", i) };
            let id = service.create(relato(&title)).await.unwrap();
            service
                .approve(&id, SubmissionKind::Relatos, "admin")
                .await
                .unwrap();
        }
        service.create(relato("Islas pendiente")).await.unwrap();

        let request = PageRequest::parse(Some(1), Some(2), Some("islas")).unwrap();
        let page = service
            .search_approved(SubmissionKind::Relatos, &request)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 2);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.relatos, KindStats { pending: 1, approved: 5 });
        assert_eq!(stats.portal_memoria, KindStats::default());
    }

    #[tokio::test]
    async fn huge_page_numbers_yield_an_empty_page() {
        let store = Arc::new(FakeStore::default());
        let service = service(store);
        let id = service.create(relato("Única")).await.unwrap();
        service
            .approve(&id, SubmissionKind::Relatos, "admin")
            .await
            .unwrap();

        let request = PageRequest::parse(Some(usize::MAX), Some(2), None).unwrap();
        let page = service
            .search_approved(SubmissionKind::Relatos, &request)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn public_reads_retry_transient_store_failures() {
        let store = Arc::new(FakeStore::default());
        store.fail_next_query(PortError::platform("firestore/unavailable", "503"));
        let service = SubmissionService::new(store.clone());

        let approved = service
            .list_approved(SubmissionKind::PortalMemoria, None)
            .await
            .unwrap();
        assert!(approved.is_empty());

        store.fail_next_query(PortError::platform("firestore/permission-denied", "403"));
        let err = service
            .list_pending(SubmissionKind::PortalMemoria)
            .await
            .unwrap_err();
        assert_eq!(err.user_message, "No tienes permisos para acceder a estos datos.");
    }
}
