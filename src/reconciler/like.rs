use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};

use crate::backend::{Notifier, RecordStore, Subscription};
use crate::engine::{MutationEngine, MutationHooks};
use crate::error::{MutationError, StoreError, SyncError, ValidationError};
use crate::event::ChangeEvent;
use crate::model::{LikeState, MutationStatus, PostId, UserId};
use crate::session::Session;

use super::RealtimeTask;

pub struct LikeVars {
    user_id: UserId,
    currently_liked: bool,
}

struct LikeHooks {
    post_id: PostId,
    state: Arc<Mutex<LikeState>>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl MutationHooks for LikeHooks {
    type Vars = LikeVars;
    type Output = ();

    async fn operation(&self, vars: &LikeVars) -> Result<(), StoreError> {
        if vars.currently_liked {
            self.store.delete_like(&self.post_id, &vars.user_id).await
        } else {
            self.store.insert_like(&self.post_id, &vars.user_id).await
        }
    }

    fn on_optimistic(&self, vars: &LikeVars) {
        let mut state = self.state.lock().unwrap();
        if vars.currently_liked {
            state.is_liked = false;
            state.like_count = state.like_count.saturating_sub(1);
        } else {
            state.is_liked = true;
            state.like_count += 1;
        }
    }

    fn on_error(&self, error: &MutationError, vars: &LikeVars) {
        {
            let mut state = self.state.lock().unwrap();
            state.is_liked = vars.currently_liked;
            state.like_count = if vars.currently_liked {
                state.like_count + 1
            } else {
                state.like_count.saturating_sub(1)
            };
        }

        warn!("Like mutation on {} failed: {error}", self.post_id);
        self.notifier.error("Failed to update like. Please try again.");
    }
}

/// Keeps the like flag and count for one (user, post) pair consistent across
/// optimistic toggles, authoritative responses and realtime corrections.
#[derive(Clone)]
pub struct LikeReconciler {
    session: Session,
    engine: Arc<MutationEngine>,
    hooks: Arc<LikeHooks>,
}

impl LikeReconciler {
    pub fn new(
        post_id: PostId,
        session: Session,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            session,
            engine: Arc::new(MutationEngine::new()),
            hooks: Arc::new(LikeHooks {
                post_id,
                state: Arc::new(Mutex::new(LikeState::default())),
                store,
                notifier,
            }),
        }
    }

    pub fn state(&self) -> LikeState {
        self.hooks.state.lock().unwrap().clone()
    }

    pub fn status(&self) -> MutationStatus {
        self.engine.status()
    }

    /// Flips the like optimistically, then inserts or deletes the backing
    /// row. Rolls back and notifies on failure.
    pub async fn toggle_like(&self) -> Result<(), SyncError> {
        let user = match self.session.current_user() {
            Some(user) => user,
            None => {
                self.hooks.notifier.error("Please sign in to like posts");
                return Err(ValidationError::SignedOut.into());
            }
        };

        let currently_liked = self.hooks.state.lock().unwrap().is_liked;
        self.engine
            .mutate(
                &*self.hooks,
                LikeVars {
                    user_id: user.id,
                    currently_liked,
                },
            )
            .await?;
        Ok(())
    }

    /// Mount-time fetch of the authoritative state.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let user_id = self.session.current_user().map(|u| u.id);
        let snapshot = self
            .hooks
            .store
            .like_summary(&self.hooks.post_id, user_id.as_ref())
            .await?;
        self.sync_state(snapshot);
        Ok(())
    }

    /// Adopts an authoritative snapshot, unless an optimistic update is in
    /// flight (a stale fetch must not clobber it).
    pub fn sync_state(&self, snapshot: LikeState) {
        if self.engine.status().is_optimistic {
            debug!("Like sync on {} skipped, mutation in flight", self.hooks.post_id);
            return;
        }
        *self.hooks.state.lock().unwrap() = snapshot;
    }

    /// Merges one realtime correction. Counts are clamped at zero, so this
    /// commutes with the mutation callbacks regardless of arrival order.
    pub fn apply_event(&self, event: &ChangeEvent) {
        let local_user = self.session.current_user().map(|u| u.id);

        match event {
            ChangeEvent::LikeInserted { post_id, user_id } if *post_id == self.hooks.post_id => {
                let mut state = self.hooks.state.lock().unwrap();
                state.like_count += 1;
                if local_user.as_ref() == Some(user_id) {
                    state.is_liked = true;
                }
            }
            ChangeEvent::LikeDeleted { post_id, user_id } if *post_id == self.hooks.post_id => {
                let mut state = self.hooks.state.lock().unwrap();
                state.like_count = state.like_count.saturating_sub(1);
                if local_user.as_ref() == Some(user_id) {
                    state.is_liked = false;
                }
            }
            _ => {}
        }
    }

    /// Forwards subscription events into `apply_event` until the returned
    /// task is dropped.
    pub fn spawn_realtime(&self, mut subscription: Subscription) -> RealtimeTask {
        let this = self.clone();
        RealtimeTask::spawn(async move {
            while let Some(event) = subscription.next().await {
                this.apply_event(&event);
            }
        })
    }
}
