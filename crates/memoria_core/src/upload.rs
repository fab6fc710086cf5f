//! crates/memoria_core/src/upload.rs
//!
//! Coordinates the three image slots of a submission form. Each upload runs
//! validate -> compress -> store, and publishes its progress through a watch
//! channel so observers can render it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::{ImageFile, ImageSlot, SubmissionKind, UploadState};
use crate::errors::{PlatformError, UNKNOWN_ERROR};
use crate::image_processing::{
    file_extension, smart_compress, unique_file_name, validate_image, CompressionOptions,
    SmartCompressOptions, MAX_BANNER_IMAGE_SIZE, MAX_DNI_IMAGE_SIZE, MAX_PORTAL_IMAGE_SIZE,
};
use crate::ports::ObjectStorage;
use crate::retry::{retry_with_backoff, RetryPolicy};

const PROGRESS_STEP: u8 = 10;
const PROGRESS_CAP: u8 = 90;
const DEFAULT_TICK: Duration = Duration::from_millis(200);

/// Snapshot of every slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadStates {
    pub dni: UploadState,
    pub banner: UploadState,
    pub image: UploadState,
}

impl UploadStates {
    pub fn slot(&self, slot: ImageSlot) -> &UploadState {
        match slot {
            ImageSlot::Dni => &self.dni,
            ImageSlot::Banner => &self.banner,
            ImageSlot::Image => &self.image,
        }
    }

    fn slot_mut(&mut self, slot: ImageSlot) -> &mut UploadState {
        match slot {
            ImageSlot::Dni => &mut self.dni,
            ImageSlot::Banner => &mut self.banner,
            ImageSlot::Image => &mut self.image,
        }
    }

    pub fn is_any_uploading(&self) -> bool {
        self.dni.is_uploading || self.banner.is_uploading || self.image.is_uploading
    }
}

/// Download URLs of a kind's required slots, once all of them are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledUrls {
    pub dni_image_url: String,
    /// Banner for relatos, memorial image for portal entries.
    pub media_url: String,
}

struct SlotPlan {
    slot: ImageSlot,
    max_bytes: usize,
    options: SmartCompressOptions,
    directory: String,
}

impl SlotPlan {
    fn new(slot: ImageSlot, kind: SubmissionKind) -> Self {
        let (max_bytes, max_dimension, directory) = match slot {
            ImageSlot::Dni => (MAX_DNI_IMAGE_SIZE, (1200, 1200), "dni"),
            ImageSlot::Banner => (MAX_BANNER_IMAGE_SIZE, (1920, 1080), "banners"),
            ImageSlot::Image => (MAX_PORTAL_IMAGE_SIZE, (1920, 1080), "images"),
        };
        Self {
            slot,
            max_bytes,
            options: SmartCompressOptions {
                compression: CompressionOptions {
                    max_width: max_dimension.0,
                    max_height: max_dimension.1,
                    ..CompressionOptions::default()
                },
                max_size_bytes: max_bytes / 10 * 8,
            },
            directory: format!("{}/{}", kind.collection(), directory),
        }
    }
}

pub struct UploadCoordinator {
    storage: Arc<dyn ObjectStorage>,
    states: Arc<watch::Sender<UploadStates>>,
    retry: RetryPolicy,
    tick: Duration,
}

impl UploadCoordinator {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        let (states, _) = watch::channel(UploadStates::default());
        Self {
            storage,
            states: Arc::new(states),
            retry: RetryPolicy::default(),
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn states(&self) -> UploadStates {
        self.states.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStates> {
        self.states.subscribe()
    }

    pub fn is_any_uploading(&self) -> bool {
        self.states.borrow().is_any_uploading()
    }

    pub async fn upload_dni_image(&self, file: ImageFile, kind: SubmissionKind) -> Result<String, PlatformError> {
        self.upload(SlotPlan::new(ImageSlot::Dni, kind), file).await
    }

    pub async fn upload_banner_image(&self, file: ImageFile) -> Result<String, PlatformError> {
        self.upload(SlotPlan::new(ImageSlot::Banner, SubmissionKind::Relatos), file)
            .await
    }

    pub async fn upload_portal_memoria_image(&self, file: ImageFile) -> Result<String, PlatformError> {
        self.upload(SlotPlan::new(ImageSlot::Image, SubmissionKind::PortalMemoria), file)
            .await
    }

    pub fn reset(&self, slot: ImageSlot) {
        self.states
            .send_modify(|states| *states.slot_mut(slot) = UploadState::default());
    }

    pub fn reset_all(&self) {
        self.states.send_replace(UploadStates::default());
    }

    /// The URLs `kind` needs, or `None` while a slot is empty or any upload runs.
    pub fn settled_urls(&self, kind: SubmissionKind) -> Option<SettledUrls> {
        let states = self.states.borrow();
        if states.is_any_uploading() {
            return None;
        }
        let media = match kind {
            SubmissionKind::Relatos => &states.banner,
            SubmissionKind::PortalMemoria => &states.image,
        };
        Some(SettledUrls {
            dni_image_url: states.dni.url.clone()?,
            media_url: media.url.clone()?,
        })
    }

    #[instrument(skip(self, plan, file), fields(slot = ?plan.slot, size = file.size()))]
    async fn upload(&self, plan: SlotPlan, file: ImageFile) -> Result<String, PlatformError> {
        let slot = plan.slot;
        self.states.send_modify(|states| {
            *states.slot_mut(slot) = UploadState {
                is_uploading: true,
                ..UploadState::default()
            }
        });

        let ticker = CancellationToken::new();
        // Stops the ticker even if this future is dropped mid-upload.
        let _stop_ticker = ticker.clone().drop_guard();
        tokio::spawn(tick_progress(self.states.clone(), slot, self.tick, ticker.clone()));

        let result = self.process_and_store(&plan, file).await;
        ticker.cancel();

        match result {
            Ok(url) => {
                info!(url = %url, "Image uploaded");
                self.states.send_modify(|states| {
                    *states.slot_mut(slot) = UploadState {
                        is_uploading: false,
                        progress: 100,
                        url: Some(url.clone()),
                        error: None,
                    }
                });
                Ok(url)
            }
            Err(err) => {
                warn!(code = %err.code, "Image upload failed");
                self.states.send_modify(|states| {
                    *states.slot_mut(slot) = UploadState {
                        is_uploading: false,
                        progress: 0,
                        url: None,
                        error: Some(err.user_message.clone()),
                    }
                });
                Err(err)
            }
        }
    }

    async fn process_and_store(&self, plan: &SlotPlan, file: ImageFile) -> Result<String, PlatformError> {
        validate_image(&file, plan.max_bytes)?;

        let options = plan.options;
        let processed = tokio::task::spawn_blocking(move || smart_compress(file, &options))
            .await
            .map_err(|e| PlatformError::new(UNKNOWN_ERROR, e.to_string()))??;

        let path = format!(
            "{}/{}",
            plan.directory,
            unique_file_name(&file_extension(&processed.name))
        );
        let path = path.as_str();
        let processed = &processed;
        let storage = self.storage.as_ref();
        retry_with_backoff(self.retry, || storage.upload(path, processed)).await
    }
}

async fn tick_progress(
    states: Arc<watch::Sender<UploadStates>>,
    slot: ImageSlot,
    tick: Duration,
    stop: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                states.send_if_modified(|states| {
                    let state = states.slot_mut(slot);
                    if !state.is_uploading || state.progress >= PROGRESS_CAP {
                        return false;
                    }
                    state.progress = (state.progress + PROGRESS_STEP).min(PROGRESS_CAP);
                    true
                });
            }
        }
    }
}
