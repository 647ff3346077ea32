use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};

use crate::backend::{Notifier, RecordStore, Subscription};
use crate::engine::{MutationEngine, MutationHooks};
use crate::error::{MutationError, StoreError, SyncError, ValidationError};
use crate::event::ChangeEvent;
use crate::model::{
    AuthorProfile, Comment, CommentId, MutationStatus, NewComment, PostId, UserId,
};
use crate::session::Session;
use crate::CONFIG;

use super::RealtimeTask;

pub struct CommentVars {
    temp_id: CommentId,
    content: String,
    author_id: UserId,
    author: AuthorProfile,
}

struct CommentHooks {
    post_id: PostId,
    comments: Arc<Mutex<Vec<Comment>>>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl MutationHooks for CommentHooks {
    type Vars = CommentVars;
    type Output = Comment;

    async fn operation(&self, vars: &CommentVars) -> Result<Comment, StoreError> {
        self.store
            .insert_comment(NewComment {
                post_id: self.post_id.clone(),
                author_id: vars.author_id.clone(),
                content: vars.content.clone(),
            })
            .await
    }

    fn on_optimistic(&self, vars: &CommentVars) {
        self.comments.lock().unwrap().push(Comment {
            id: vars.temp_id.clone(),
            content: vars.content.clone(),
            created_at: Utc::now(),
            author_id: vars.author_id.clone(),
            post_id: self.post_id.clone(),
            author: Some(vars.author.clone()),
            is_optimistic: true,
            is_pending: true,
        });
    }

    fn on_success(&self, confirmed: &Comment, vars: &CommentVars) {
        let mut comments = self.comments.lock().unwrap();

        // The realtime echo of our own insert may land before this callback;
        // in that case the confirmed record is already present and the
        // placeholder just goes away.
        if comments.iter().any(|c| c.id == confirmed.id) {
            comments.retain(|c| c.id != vars.temp_id);
            return;
        }

        match comments.iter_mut().find(|c| c.id == vars.temp_id) {
            Some(entry) => {
                // Replace in place, keeping the list position and whatever
                // author profile the placeholder already showed.
                let author = entry.author.take().or_else(|| confirmed.author.clone());
                *entry = Comment {
                    author,
                    ..confirmed.clone()
                };
            }
            None => {
                // The placeholder was dropped by a sync while we were in
                // flight; adopt the confirmed record rather than lose it.
                comments.push(confirmed.clone());
            }
        }
    }

    fn on_error(&self, error: &MutationError, vars: &CommentVars) {
        self.comments
            .lock()
            .unwrap()
            .retain(|c| c.id != vars.temp_id);

        warn!("Comment mutation on {} failed: {error}", self.post_id);
        self.notifier.error("Failed to post comment. Please try again.");
    }
}

/// Keeps the ordered comment list for one post consistent across optimistic
/// inserts, authoritative confirmations, realtime arrivals from other
/// sessions, and periodic full fetches.
#[derive(Clone)]
pub struct CommentReconciler {
    session: Session,
    engine: Arc<MutationEngine>,
    hooks: Arc<CommentHooks>,
    temp_seq: Arc<AtomicU64>,
}

impl CommentReconciler {
    pub fn new(
        post_id: PostId,
        session: Session,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            session,
            engine: Arc::new(MutationEngine::new()),
            hooks: Arc::new(CommentHooks {
                post_id,
                comments: Arc::new(Mutex::new(Vec::new())),
                store,
                notifier,
            }),
            temp_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.hooks.comments.lock().unwrap().clone()
    }

    pub fn status(&self) -> MutationStatus {
        self.engine.status()
    }

    /// Validates, appends an optimistic placeholder, and runs the
    /// authoritative insert. The placeholder's temporary id travels with the
    /// mutation, so the settling callbacks address exactly the entry this
    /// call created.
    pub async fn add_comment(&self, content: &str) -> Result<Comment, SyncError> {
        let user = match self.session.current_user() {
            Some(user) => user,
            None => {
                self.hooks.notifier.error("Please sign in to comment");
                return Err(ValidationError::SignedOut.into());
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            self.hooks.notifier.error("Comment cannot be empty");
            return Err(ValidationError::EmptyComment.into());
        }

        let len = trimmed.chars().count();
        if len > CONFIG.max_comment_len {
            self.hooks.notifier.error(&format!(
                "Comment is too long (max {} characters)",
                CONFIG.max_comment_len
            ));
            return Err(ValidationError::CommentTooLong {
                len,
                max: CONFIG.max_comment_len,
            }
            .into());
        }

        let vars = CommentVars {
            temp_id: self.next_temp_id(),
            content: trimmed.to_string(),
            author: AuthorProfile::from(&user),
            author_id: user.id,
        };

        Ok(self.engine.mutate(&*self.hooks, vars).await?)
    }

    /// Adopts an authoritative list. Wholesale when no mutation is in
    /// flight; otherwise confirmed entries win and optimistic ones are kept
    /// unless the server already shows the same (author, content).
    pub fn sync_comments(&self, server_comments: Vec<Comment>) {
        let mut comments = self.hooks.comments.lock().unwrap();

        if !self.engine.status().is_optimistic {
            *comments = server_comments;
            return;
        }

        let confirmed: Vec<Comment> = server_comments
            .into_iter()
            .filter(|c| c.is_confirmed())
            .collect();
        let kept: Vec<Comment> = comments
            .iter()
            .filter(|c| c.is_optimistic)
            .filter(|optimistic| {
                !confirmed.iter().any(|server| {
                    server.content == optimistic.content
                        && server.author_id == optimistic.author_id
                })
            })
            .cloned()
            .collect();

        debug!(
            "Comment sync on {} merged {} confirmed with {} optimistic",
            self.hooks.post_id,
            confirmed.len(),
            kept.len()
        );

        *comments = confirmed;
        comments.extend(kept);
    }

    /// Appends a confirmed comment from the realtime channel. Idempotent:
    /// a comment whose id is already present is skipped, which also covers
    /// the echo of this session's own writes.
    pub fn add_realtime_comment(&self, comment: Comment) {
        let mut comments = self.hooks.comments.lock().unwrap();
        if comments.iter().any(|c| c.id == comment.id) {
            return;
        }
        comments.push(comment);
    }

    pub fn remove_comment(&self, comment_id: &CommentId) {
        self.hooks
            .comments
            .lock()
            .unwrap()
            .retain(|c| &c.id != comment_id);
    }

    /// Out-of-band cache fill: attaches author profiles to comments that do
    /// not have one yet. Not part of the ordering contract.
    pub fn merge_profiles(&self, profiles: &HashMap<UserId, AuthorProfile>) {
        let mut comments = self.hooks.comments.lock().unwrap();
        for comment in comments.iter_mut() {
            if comment.author.is_none() {
                comment.author = profiles.get(&comment.author_id).cloned();
            }
        }
    }

    /// Full fetch of the list plus author profiles, fed through the merge.
    /// This is the eventual-consistency source of truth; the realtime
    /// channel is only the low-latency signal.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let server_comments = self.hooks.store.comments_for(&self.hooks.post_id).await?;

        let mut author_ids: Vec<UserId> =
            server_comments.iter().map(|c| c.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();

        self.sync_comments(server_comments);

        if !author_ids.is_empty() {
            let profiles = self.hooks.store.profiles(&author_ids).await?;
            self.merge_profiles(&profiles);
        }
        Ok(())
    }

    pub fn spawn_realtime(&self, mut subscription: Subscription) -> RealtimeTask {
        let this = self.clone();
        RealtimeTask::spawn(async move {
            while let Some(event) = subscription.next().await {
                match event {
                    ChangeEvent::CommentInserted { comment }
                        if comment.post_id == this.hooks.post_id =>
                    {
                        this.add_realtime_comment(comment);
                    }
                    ChangeEvent::CommentDeleted {
                        post_id,
                        comment_id,
                    } if post_id == this.hooks.post_id => {
                        this.remove_comment(&comment_id);
                    }
                    _ => {}
                }
            }
        })
    }

    /// Periodic `refresh` fallback for when the realtime channel drops
    /// events or dies silently.
    pub fn spawn_poller(&self, interval: Duration) -> RealtimeTask {
        let this = self.clone();
        RealtimeTask::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(error) = this.refresh().await {
                    warn!("Comment poll on {} failed: {error}", this.hooks.post_id);
                }
            }
        })
    }

    fn next_temp_id(&self) -> CommentId {
        format!(
            "temp-{}-{}",
            Utc::now().timestamp_millis(),
            self.temp_seq.fetch_add(1, Relaxed) + 1
        )
    }
}
