use std::sync::Arc;
use std::time::Duration;

use log::info;

use bugpin_sync::backend::memory::{MemoryBackend, MemoryNotifier, RealtimeHub};
use bugpin_sync::backend::Realtime;
use bugpin_sync::event::Topic;
use bugpin_sync::model::{AuthorProfile, Upload};
use bugpin_sync::reconciler::{CommentReconciler, LikeReconciler, UploadReconciler};
use bugpin_sync::session::{SessionController, SessionUser};
use bugpin_sync::CONFIG;

/// Two sessions against the in-memory backend: alice uploads a post and
/// comments on it, bob follows along over the realtime feed and likes it.
#[tokio::main]
async fn main() {
    env_logger::init();

    let hub = Arc::new(RealtimeHub::new());
    let backend = Arc::new(MemoryBackend::new(hub.clone()));
    let notifier = Arc::new(MemoryNotifier::new());

    for (id, username) in [("u-alice", "alice"), ("u-bob", "bob")] {
        backend.upsert_profile(
            &id.to_string(),
            AuthorProfile {
                username: username.to_string(),
                display_name: None,
                avatar_url: None,
            },
        );
    }

    let (_alice_identity, alice) = SessionController::new(Some(SessionUser {
        id: "u-alice".to_string(),
        username: "alice".to_string(),
    }));
    let (_bob_identity, bob) = SessionController::new(Some(SessionUser {
        id: "u-bob".to_string(),
        username: "bob".to_string(),
    }));

    let uploads = UploadReconciler::new(
        alice.clone(),
        backend.clone(),
        backend.clone(),
        notifier.clone(),
    );
    let result = uploads
        .upload_post(Upload {
            bytes: b"\x89PNG fake screenshot".to_vec(),
            file_name: "segfault.png".to_string(),
            caption: "Segmentation fault (core dumped)".to_string(),
        })
        .await
        .expect("upload should succeed against the memory backend");
    info!("Uploaded post {} at {}", result.post_id, result.image_url);

    // Bob's view of the post, corrected over the realtime feed.
    let bob_comments = CommentReconciler::new(
        result.post_id.clone(),
        bob.clone(),
        backend.clone(),
        notifier.clone(),
    );
    let bob_likes = LikeReconciler::new(
        result.post_id.clone(),
        bob.clone(),
        backend.clone(),
        notifier.clone(),
    );
    let _comment_feed =
        bob_comments.spawn_realtime(hub.subscribe(Topic::Comments(result.post_id.clone())));
    let _like_feed = bob_likes.spawn_realtime(hub.subscribe(Topic::Likes(result.post_id.clone())));
    let _poller = bob_comments.spawn_poller(CONFIG.poll_interval());

    let alice_comments = CommentReconciler::new(
        result.post_id.clone(),
        alice.clone(),
        backend.clone(),
        notifier.clone(),
    );
    alice_comments
        .add_comment("Classic off-by-one, check the loop bounds")
        .await
        .expect("comment should succeed");

    bob_likes.toggle_like().await.expect("like should succeed");
    bob_comments
        .add_comment("Been there. gdb is your friend")
        .await
        .expect("comment should succeed");

    // Let the feed deliver before reading bob's view.
    tokio::time::sleep(Duration::from_millis(50)).await;
    bob_comments.refresh().await.expect("refresh should succeed");

    println!("post {} — {} like(s)", result.post_id, bob_likes.state().like_count);
    for comment in bob_comments.comments() {
        let author = comment
            .author
            .as_ref()
            .map(|a| a.username.as_str())
            .unwrap_or(comment.author_id.as_str());
        println!("  {}: {}", author, comment.content);
    }
}
