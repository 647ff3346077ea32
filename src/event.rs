use serde::{Deserialize, Serialize};

use crate::model::{Comment, CommentId, PostId, UserId};

/// One (table, target) realtime filter, mirroring the backend's
/// `likes:<post>` / `comments:<post>` channel naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Likes(PostId),
    Comments(PostId),
}

/// A record change pushed by the backend, validated into a closed set of
/// variants at the subscription boundary. Reconcilers only ever see these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    LikeInserted { post_id: PostId, user_id: UserId },
    LikeDeleted { post_id: PostId, user_id: UserId },
    CommentInserted { comment: Comment },
    CommentDeleted { post_id: PostId, comment_id: CommentId },
}

impl ChangeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::LikeInserted { post_id, .. } | Self::LikeDeleted { post_id, .. } => {
                Topic::Likes(post_id.clone())
            }
            Self::CommentInserted { comment } => Topic::Comments(comment.post_id.clone()),
            Self::CommentDeleted { post_id, .. } => Topic::Comments(post_id.clone()),
        }
    }
}
