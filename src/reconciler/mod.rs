mod comment;
mod like;
mod upload;

pub use comment::CommentReconciler;
pub use like::LikeReconciler;
pub use upload::UploadReconciler;

use std::future::Future;

use tokio::task::JoinHandle;

/// Handle to a background correction task (realtime forwarding or polling).
/// Dropping it aborts the task, which is how a reconciler detaches from its
/// channel on teardown; in-flight mutations are left to settle on their own.
pub struct RealtimeTask {
    handle: JoinHandle<()>,
}

impl RealtimeTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for RealtimeTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
