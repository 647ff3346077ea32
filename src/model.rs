use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MutationError;

pub type PostId = String;
pub type UserId = String;
pub type CommentId = String;

/// Snapshot of one mutation engine's transient status.
///
/// Concurrent `mutate` calls on the same engine are last-write-wins on these
/// flags; each call's own optimistic/rollback closures stay consistent on
/// their own (matched increment/decrement, temp-id add/remove).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationStatus {
    pub is_loading: bool,
    pub is_optimistic: bool,
    pub error: Option<MutationError>,
}

/// Like state for one (user, post) pair, as shown in the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub is_liked: bool,
    pub like_count: u64,
}

/// Display data for a comment author, cache-filled out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// One user-authored note on a post.
///
/// Optimistic entries carry a client-generated `temp-` id until the store
/// confirms them; entries arriving over the realtime channel are born
/// confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author_id: UserId,
    pub post_id: PostId,
    pub author: Option<AuthorProfile>,
    pub is_optimistic: bool,
    pub is_pending: bool,
}

impl Comment {
    pub fn is_confirmed(&self) -> bool {
        !self.is_optimistic
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub image_url: String,
    pub author_id: UserId,
    pub language: Option<String>,
    pub error_type: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    pub title: String,
    pub image_url: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub language: Option<String>,
    pub error_type: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStage {
    Idle,
    Moderating,
    Uploading,
    Processing,
    Complete,
    Error,
}

/// Progress feedback for one upload attempt. Monotonic within an attempt,
/// except on error or reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub stage: UploadStage,
    pub progress: u8,
    pub message: String,
}

impl UploadProgress {
    pub fn idle() -> Self {
        Self {
            stage: UploadStage::Idle,
            progress: 0,
            message: String::new(),
        }
    }
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::idle()
    }
}

/// A screenshot ready to be stored, plus its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub post_id: PostId,
    pub image_url: String,
}
