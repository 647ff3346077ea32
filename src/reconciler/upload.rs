use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::backend::{Notifier, ObjectStore, RecordStore};
use crate::engine::{MutationEngine, MutationHooks};
use crate::error::{MutationError, StoreError, SyncError, ValidationError};
use crate::model::{
    MutationStatus, NewPost, Upload, UploadProgress, UploadResult, UploadStage, UserId,
};
use crate::session::Session;
use crate::CONFIG;

pub struct UploadVars {
    upload: Upload,
    author_id: UserId,
}

type ProgressListeners = Mutex<Vec<UnboundedSender<UploadProgress>>>;

fn push_progress(
    progress: &Mutex<UploadProgress>,
    listeners: &ProgressListeners,
    next: UploadProgress,
) {
    debug!("Upload progress: {:?} {}%", next.stage, next.progress);
    *progress.lock().unwrap() = next.clone();
    listeners
        .lock()
        .unwrap()
        .retain(|listener| listener.send(next.clone()).is_ok());
}

struct UploadHooks {
    progress: Arc<Mutex<UploadProgress>>,
    listeners: Arc<ProgressListeners>,
    attempt: Arc<AtomicU64>,
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
}

impl UploadHooks {
    fn set(&self, stage: UploadStage, progress: u8, message: &str) {
        push_progress(
            &self.progress,
            &self.listeners,
            UploadProgress {
                stage,
                progress,
                message: message.to_string(),
            },
        );
    }

    /// Returns to idle after `delay`, unless another attempt (or a manual
    /// reset) has started in the meantime.
    fn schedule_reset(&self, delay: Duration) {
        let seen = self.attempt.load(Relaxed);
        let attempt = self.attempt.clone();
        let progress = self.progress.clone();
        let listeners = self.listeners.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if attempt.load(Relaxed) == seen {
                push_progress(&progress, &listeners, UploadProgress::idle());
            }
        });
    }
}

#[async_trait]
impl MutationHooks for UploadHooks {
    type Vars = UploadVars;
    type Output = UploadResult;

    async fn operation(&self, vars: &UploadVars) -> Result<UploadResult, StoreError> {
        self.set(UploadStage::Uploading, 25, "Uploading image...");

        let key = object_key(&vars.upload.file_name);
        self.objects.store(&key, vars.upload.bytes.clone()).await?;

        self.set(UploadStage::Processing, 50, "Processing image...");
        let image_url = self.objects.public_url(&key).await?;

        self.set(UploadStage::Processing, 75, "Creating post...");
        let caption = vars.upload.caption.trim();
        let title = if caption.is_empty() {
            "Untitled Error".to_string()
        } else {
            caption.to_string()
        };
        let post_id = self
            .records
            .insert_post(NewPost {
                title,
                image_url: image_url.clone(),
                author_id: vars.author_id.clone(),
                language: None,
                error_type: None,
                tags: None,
            })
            .await?;

        self.set(UploadStage::Complete, 100, "Upload complete!");
        Ok(UploadResult { post_id, image_url })
    }

    fn on_optimistic(&self, _vars: &UploadVars) {
        self.attempt.fetch_add(1, Relaxed);
        self.set(UploadStage::Moderating, 10, "Starting upload...");
    }

    fn on_success(&self, result: &UploadResult, _vars: &UploadVars) {
        debug!("Upload finished as post {}", result.post_id);
        self.notifier.success("Post uploaded successfully!");
        self.schedule_reset(CONFIG.success_reset_delay());
    }

    fn on_error(&self, error: &MutationError, _vars: &UploadVars) {
        self.set(UploadStage::Error, 0, &error.to_string());

        warn!("Upload failed: {error}");
        self.notifier.error("Upload failed. Please try again.");
        self.schedule_reset(CONFIG.error_reset_delay());
    }
}

/// Drives the stage/percent/message feedback for one upload-then-create-post
/// operation. No optimistic entity exists; this is purely user feedback, and
/// retries are always manual.
#[derive(Clone)]
pub struct UploadReconciler {
    session: Session,
    engine: Arc<MutationEngine>,
    hooks: Arc<UploadHooks>,
}

impl UploadReconciler {
    pub fn new(
        session: Session,
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            session,
            engine: Arc::new(MutationEngine::new()),
            hooks: Arc::new(UploadHooks {
                progress: Arc::new(Mutex::new(UploadProgress::idle())),
                listeners: Arc::new(Mutex::new(Vec::new())),
                attempt: Arc::new(AtomicU64::new(0)),
                objects,
                records,
                notifier,
            }),
        }
    }

    pub fn progress(&self) -> UploadProgress {
        self.hooks.progress.lock().unwrap().clone()
    }

    /// Lossless stream of progress transitions, for progress indicators.
    pub fn progress_updates(&self) -> UnboundedReceiver<UploadProgress> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hooks.listeners.lock().unwrap().push(sender);
        receiver
    }

    pub fn status(&self) -> MutationStatus {
        self.engine.status()
    }

    /// Stores the screenshot, resolves its public url, and creates the post
    /// record, updating the stage before each step. Any step failing aborts
    /// the rest.
    pub async fn upload_post(&self, upload: Upload) -> Result<UploadResult, SyncError> {
        let user = match self.session.current_user() {
            Some(user) => user,
            None => {
                self.hooks.notifier.error("Please sign in to upload");
                return Err(ValidationError::SignedOut.into());
            }
        };

        Ok(self
            .engine
            .mutate(
                &*self.hooks,
                UploadVars {
                    upload,
                    author_id: user.id,
                },
            )
            .await?)
    }

    pub fn reset(&self) {
        // Invalidate any pending delayed reset before going idle.
        self.hooks.attempt.fetch_add(1, Relaxed);
        push_progress(
            &self.hooks.progress,
            &self.hooks.listeners,
            UploadProgress::idle(),
        );
        self.engine.reset();
    }
}

fn object_key(file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("png");

    let name: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();

    format!("error-images/{}.{ext}", name.to_lowercase())
}
