//! crates/memoria_core/src/submission.rs
//!
//! One visitor submission end to end: validate the form, upload its images,
//! then store the document as pending. Nothing is stored unless every upload
//! succeeded.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::{NewSubmission, SubmissionContent, SubmissionKind, SubmissionMetadata};
use crate::errors::{PlatformError, UNKNOWN_ERROR};
use crate::moderation::SubmissionService;
use crate::ports::ObjectStorage;
use crate::retry::RetryPolicy;
use crate::upload::UploadCoordinator;
use crate::validation::{
    validate_new_submission, validate_portal_memoria_submission, validate_relato_submission,
    FieldErrors, PortalMemoriaForm, RelatoForm, ValidSubmission,
};

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission has invalid fields: {0}")]
    Invalid(#[from] FieldErrors),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub struct SubmissionWorkflow {
    storage: Arc<dyn ObjectStorage>,
    service: Arc<SubmissionService>,
    retry: RetryPolicy,
}

impl SubmissionWorkflow {
    pub fn new(storage: Arc<dyn ObjectStorage>, service: Arc<SubmissionService>) -> Self {
        Self {
            storage,
            service,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn submit_relato(
        &self,
        form: RelatoForm,
        metadata: SubmissionMetadata,
    ) -> Result<String, SubmissionError> {
        let valid = validate_relato_submission(&form)?;
        self.submit(ValidSubmission::Relato(valid), metadata).await
    }

    pub async fn submit_portal_memoria(
        &self,
        form: PortalMemoriaForm,
        metadata: SubmissionMetadata,
    ) -> Result<String, SubmissionError> {
        let valid = validate_portal_memoria_submission(&form)?;
        self.submit(ValidSubmission::PortalMemoria(valid), metadata)
            .await
    }

    /// Uploads a validated form's images and stores it as pending.
    #[instrument(skip_all, fields(source = metadata.source.as_str()))]
    pub async fn submit(
        &self,
        valid: ValidSubmission,
        metadata: SubmissionMetadata,
    ) -> Result<String, SubmissionError> {
        // Each submission gets its own set of slots.
        let uploads = UploadCoordinator::new(self.storage.clone()).with_retry(self.retry);

        let new = match valid {
            ValidSubmission::Relato(relato) => {
                let kind = SubmissionKind::Relatos;
                futures::try_join!(
                    uploads.upload_dni_image(relato.dni_image, kind),
                    uploads.upload_banner_image(relato.banner_image)
                )?;
                let urls = uploads.settled_urls(kind).ok_or_else(unsettled)?;
                NewSubmission {
                    submitter: relato.submitter,
                    dni_image_url: urls.dni_image_url,
                    metadata,
                    content: SubmissionContent::Relato {
                        title: relato.title,
                        content: relato.content,
                        banner_image_url: urls.media_url,
                    },
                }
            }
            ValidSubmission::PortalMemoria(entry) => {
                let kind = SubmissionKind::PortalMemoria;
                futures::try_join!(
                    uploads.upload_dni_image(entry.dni_image, kind),
                    uploads.upload_portal_memoria_image(entry.image)
                )?;
                let urls = uploads.settled_urls(kind).ok_or_else(unsettled)?;
                NewSubmission {
                    submitter: entry.submitter,
                    dni_image_url: urls.dni_image_url,
                    metadata,
                    content: SubmissionContent::PortalMemoria {
                        description: entry.description,
                        image_url: urls.media_url,
                    },
                }
            }
        };

        validate_new_submission(&new)?;
        let id = self.service.create(new).await?;
        info!(id = %id, "Submission received");
        Ok(id)
    }
}

fn unsettled() -> PlatformError {
    PlatformError::new(UNKNOWN_ERROR, "uploads finished without every required URL")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImageFile, SubmissionStatus};
    use crate::image_processing::tests::png_file;
    use crate::image_processing::MEGABYTE;
    use crate::ports::PortError;
    use crate::testing::{FakeStorage, FakeStore};

    struct Harness {
        store: Arc<FakeStore>,
        storage: Arc<FakeStorage>,
        workflow: SubmissionWorkflow,
        service: Arc<SubmissionService>,
    }

    fn harness() -> Harness {
        let store = Arc::new(FakeStore::default());
        let storage = Arc::new(FakeStorage::default());
        let service = Arc::new(SubmissionService::new(store.clone()).with_retry(RetryPolicy::none()));
        let workflow =
            SubmissionWorkflow::new(storage.clone(), service.clone()).with_retry(RetryPolicy::none());
        Harness {
            store,
            storage,
            workflow,
            service,
        }
    }

    fn portal_form() -> PortalMemoriaForm {
        PortalMemoriaForm {
            name: "Rosa".into(),
            surname: "Ibáñez".into(),
            phone: "2964 15 412345".into(),
            description: "Mi padre, cabo en el crucero".into(),
            dni_image: Some(png_file(30, 20)),
            image: Some(png_file(64, 48)),
        }
    }

    #[tokio::test]
    async fn stores_a_pending_entry_with_uploaded_urls() {
        let h = harness();
        let id = h
            .workflow
            .submit_portal_memoria(portal_form(), SubmissionMetadata::default())
            .await
            .unwrap();

        let stored = h
            .service
            .get_by_id(&id, SubmissionKind::PortalMemoria)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), SubmissionStatus::Pending);
        assert_eq!(stored.submitter.phone, "296415412345");
        assert!(stored.dni_image_url.contains("portal-memoria/dni/"));
        match stored.content {
            SubmissionContent::PortalMemoria { image_url, .. } => {
                assert!(image_url.contains("portal-memoria/images/"))
            }
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(h.storage.paths().len(), 2);
    }

    #[tokio::test]
    async fn oversized_dni_creates_nothing() {
        let h = harness();
        let mut form = portal_form();
        form.dni_image = Some(ImageFile::new("dni.jpg", "image/jpeg", vec![1u8; 6 * MEGABYTE]));

        let err = h
            .workflow
            .submit_portal_memoria(form, SubmissionMetadata::default())
            .await
            .unwrap_err();
        match err {
            SubmissionError::Invalid(fields) => assert_eq!(
                fields.get("dni_image"),
                Some("El archivo es demasiado grande. Máximo 5MB.")
            ),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(h.store.len(), 0);
        assert!(h.storage.paths().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_creates_nothing() {
        let h = harness();
        h.storage
            .fail_next(PortError::platform("storage/quota-exceeded", "full"));

        let form = RelatoForm {
            name: "Hugo".into(),
            surname: "Sosa".into(),
            phone: "1145678901".into(),
            title: "Noches en Darwin".into(),
            content: "Recuerdo las noches frías y el viento que no paraba nunca.".into(),
            dni_image: Some(png_file(12, 12)),
            banner_image: Some(png_file(48, 16)),
        };
        let err = h
            .workflow
            .submit_relato(form, SubmissionMetadata::default())
            .await
            .unwrap_err();
        match err {
            SubmissionError::Platform(err) => {
                assert_eq!(err.user_message, "Se ha excedido la cuota de almacenamiento.")
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(h.store.len(), 0);
    }
}
