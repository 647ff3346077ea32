use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::backend::memory::{MemoryBackend, MemoryNotifier, RealtimeHub};
use crate::reconciler::{CommentReconciler, LikeReconciler, UploadReconciler};
use crate::session::{Session, SessionController, SessionUser};

pub struct Env {
    pub hub: Arc<RealtimeHub>,
    pub backend: Arc<MemoryBackend>,
    pub notifier: Arc<MemoryNotifier>,
}

pub fn env() -> Env {
    let hub = Arc::new(RealtimeHub::new());
    let backend = Arc::new(MemoryBackend::new(hub.clone()));
    let notifier = Arc::new(MemoryNotifier::new());
    Env {
        hub,
        backend,
        notifier,
    }
}

impl Env {
    pub fn likes(&self, session: &Session, post_id: &str) -> LikeReconciler {
        LikeReconciler::new(
            post_id.to_string(),
            session.clone(),
            self.backend.clone(),
            self.notifier.clone(),
        )
    }

    pub fn comments(&self, session: &Session, post_id: &str) -> CommentReconciler {
        CommentReconciler::new(
            post_id.to_string(),
            session.clone(),
            self.backend.clone(),
            self.notifier.clone(),
        )
    }

    pub fn uploads(&self, session: &Session) -> UploadReconciler {
        UploadReconciler::new(
            session.clone(),
            self.backend.clone(),
            self.backend.clone(),
            self.notifier.clone(),
        )
    }
}

// The controller must be kept alive for the session to see refresh events.
pub fn signed_in(id: &str, username: &str) -> (SessionController, Session) {
    SessionController::new(Some(SessionUser {
        id: id.to_string(),
        username: username.to_string(),
    }))
}

pub fn signed_out() -> (SessionController, Session) {
    SessionController::new(None)
}

/// Polls `condition` until it holds or ~1s passed.
pub async fn eventually(condition: impl Fn() -> bool, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held: {what}");
}

pub async fn recv_timeout<T>(receiver: &mut UnboundedReceiver<T>, dur: Duration) -> Option<T> {
    tokio::select! {
        value = receiver.recv() => value,
        _ = tokio::time::sleep(dur) => None,
    }
}
