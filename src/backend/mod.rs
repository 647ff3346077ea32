pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use log::warn;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::event::{ChangeEvent, Topic};
use crate::model::{AuthorProfile, Comment, LikeState, NewComment, NewPost, PostId, UserId};

/// Authoritative record store. Inserts assign the server id and timestamp;
/// the (user, post) pair for likes is unique and duplicate inserts must be
/// rejected with `StoreError::Conflict`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_like(&self, post_id: &PostId, user_id: &UserId) -> Result<(), StoreError>;

    async fn delete_like(&self, post_id: &PostId, user_id: &UserId) -> Result<(), StoreError>;

    async fn like_summary(
        &self,
        post_id: &PostId,
        user_id: Option<&UserId>,
    ) -> Result<LikeState, StoreError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError>;

    /// All comments for a post, ordered by creation time.
    async fn comments_for(&self, post_id: &PostId) -> Result<Vec<Comment>, StoreError>;

    async fn insert_post(&self, post: NewPost) -> Result<PostId, StoreError>;

    async fn profiles(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, AuthorProfile>, StoreError>;
}

/// Binary object store. Key generation is the caller's responsibility.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    async fn public_url(&self, key: &str) -> Result<String, StoreError>;
}

/// Fire-and-forget transient user notifications.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Realtime change feed, subscribable per (table, target) filter.
pub trait Realtime: Send + Sync {
    fn subscribe(&self, topic: Topic) -> Subscription;
}

/// One live subscription. Dropping it releases the channel.
pub struct Subscription {
    pub(crate) topic: Topic,
    pub(crate) receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next event on this topic, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription {:?} lagged, skipped {skipped} events", self.topic);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
