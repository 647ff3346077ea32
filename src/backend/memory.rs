use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{broadcast, Notify};

use crate::error::StoreError;
use crate::event::{ChangeEvent, Topic};
use crate::model::{
    AuthorProfile, Comment, LikeState, NewComment, NewPost, PostId, PostRecord, UserId,
};
use crate::CONFIG;

use super::{Notifier, ObjectStore, Realtime, RecordStore, Subscription};

/// In-process change feed: one broadcast channel per topic.
pub struct RealtimeHub {
    channels: Mutex<HashMap<Topic, broadcast::Sender<ChangeEvent>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let topic = event.topic();
        debug!("Hub publishing {event:?} on {topic:?}");
        // No subscribers is fine; the event is simply dropped.
        let _ = self.sender(&topic).send(event);
    }

    fn sender(&self, topic: &Topic) -> broadcast::Sender<ChangeEvent> {
        self.channels
            .lock()
            .unwrap()
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(CONFIG.channel_capacity).0)
            .clone()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Realtime for RealtimeHub {
    fn subscribe(&self, topic: Topic) -> Subscription {
        debug!("Hub subscription opened on {topic:?}");
        Subscription {
            receiver: self.sender(&topic).subscribe(),
            topic,
        }
    }
}

/// Parks the next store write until released, so tests can observe the
/// optimistic window deterministically.
pub struct Gate {
    reached: Notify,
    release: Notify,
}

impl Gate {
    fn new() -> Self {
        Self {
            reached: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once a write has reached the gate and is parked.
    pub async fn arrived(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct Tables {
    likes: Vec<(PostId, UserId)>,
    comments: Vec<Comment>,
    posts: Vec<PostRecord>,
    profiles: HashMap<UserId, AuthorProfile>,
}

/// In-memory record + object store backing the demo and the tests. Every
/// successful write is echoed to the hub, standing in for the hosted
/// backend's change feed. Writes can be held at a gate or made to fail via
/// `hold_next` / `fail_next`.
pub struct MemoryBackend {
    hub: Arc<RealtimeHub>,
    tables: Mutex<Tables>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    faults: Mutex<VecDeque<StoreError>>,
    gate: Mutex<Option<Arc<Gate>>>,
    comment_seq: AtomicU64,
    post_seq: AtomicU64,
}

impl MemoryBackend {
    pub fn new(hub: Arc<RealtimeHub>) -> Self {
        Self {
            hub,
            tables: Mutex::new(Tables::default()),
            objects: Mutex::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            comment_seq: AtomicU64::new(0),
            post_seq: AtomicU64::new(0),
        }
    }

    pub fn upsert_profile(&self, user_id: &UserId, profile: AuthorProfile) {
        self.tables
            .lock()
            .unwrap()
            .profiles
            .insert(user_id.clone(), profile);
    }

    pub fn posts(&self) -> Vec<PostRecord> {
        self.tables.lock().unwrap().posts.clone()
    }

    /// The next write fails with `error` instead of applying.
    pub fn fail_next(&self, error: StoreError) {
        self.faults.lock().unwrap().push_back(error);
    }

    /// Arms the gate for the next write.
    pub fn hold_next(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn checkpoint(&self) -> Result<(), StoreError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        if let Some(error) = self.faults.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn insert_like(&self, post_id: &PostId, user_id: &UserId) -> Result<(), StoreError> {
        self.checkpoint().await?;

        {
            let mut tables = self.tables.lock().unwrap();
            let key = (post_id.clone(), user_id.clone());
            if tables.likes.contains(&key) {
                return Err(StoreError::Conflict);
            }
            tables.likes.push(key);
        }

        self.hub.publish(ChangeEvent::LikeInserted {
            post_id: post_id.clone(),
            user_id: user_id.clone(),
        });
        Ok(())
    }

    async fn delete_like(&self, post_id: &PostId, user_id: &UserId) -> Result<(), StoreError> {
        self.checkpoint().await?;

        let removed = {
            let mut tables = self.tables.lock().unwrap();
            let before = tables.likes.len();
            tables
                .likes
                .retain(|(p, u)| !(p == post_id && u == user_id));
            tables.likes.len() < before
        };

        // Deleting an absent row matches nothing and is not an error.
        if removed {
            self.hub.publish(ChangeEvent::LikeDeleted {
                post_id: post_id.clone(),
                user_id: user_id.clone(),
            });
        }
        Ok(())
    }

    async fn like_summary(
        &self,
        post_id: &PostId,
        user_id: Option<&UserId>,
    ) -> Result<LikeState, StoreError> {
        let tables = self.tables.lock().unwrap();
        let like_count = tables.likes.iter().filter(|(p, _)| p == post_id).count() as u64;
        let is_liked = user_id.map_or(false, |user| {
            tables
                .likes
                .iter()
                .any(|(p, u)| p == post_id && u == user)
        });
        Ok(LikeState {
            is_liked,
            like_count,
        })
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.checkpoint().await?;

        let confirmed = Comment {
            id: format!("c-{}", self.comment_seq.fetch_add(1, Relaxed) + 1),
            content: comment.content,
            created_at: Utc::now(),
            author_id: comment.author_id,
            post_id: comment.post_id,
            author: None,
            is_optimistic: false,
            is_pending: false,
        };

        self.tables.lock().unwrap().comments.push(confirmed.clone());
        self.hub.publish(ChangeEvent::CommentInserted {
            comment: confirmed.clone(),
        });

        Ok(confirmed)
    }

    async fn comments_for(&self, post_id: &PostId) -> Result<Vec<Comment>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| &c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn insert_post(&self, post: NewPost) -> Result<PostId, StoreError> {
        self.checkpoint().await?;

        let id = format!("p-{}", self.post_seq.fetch_add(1, Relaxed) + 1);
        self.tables.lock().unwrap().posts.push(PostRecord {
            id: id.clone(),
            title: post.title,
            image_url: post.image_url,
            author_id: post.author_id,
            created_at: Utc::now(),
            language: post.language,
            error_type: post.error_type,
            tags: post.tags,
        });

        info!("Post {id} created");
        Ok(id)
    }

    async fn profiles(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, AuthorProfile>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.checkpoint().await?;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, StoreError> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(StoreError::NotFound);
        }
        Ok(format!("memory://uploads/{key}"))
    }
}

/// Records notifications (inspectable from tests) and mirrors them to the log.
pub struct MemoryNotifier {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self {
            successes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for MemoryNotifier {
    fn success(&self, message: &str) {
        info!("toast: {message}");
        self.successes.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        warn!("toast: {message}");
        self.errors.lock().unwrap().push(message.to_string());
    }
}
