use std::time::Duration;

use chrono::Utc;

use crate::backend::{Realtime, RecordStore};
use crate::error::{StoreError, SyncError, ValidationError};
use crate::event::{ChangeEvent, Topic};
use crate::model::{AuthorProfile, Comment, NewComment};

use super::utils::{env, eventually, signed_in, signed_out};

fn confirmed(id: &str, post_id: &str, author_id: &str, content: &str) -> Comment {
    Comment {
        id: id.to_string(),
        content: content.to_string(),
        created_at: Utc::now(),
        author_id: author_id.to_string(),
        post_id: post_id.to_string(),
        author: None,
        is_optimistic: false,
        is_pending: false,
    }
}

#[tokio::test]
async fn empty_and_overlong_comments_are_rejected_before_any_network_call() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    assert_eq!(
        comments.add_comment("   ").await,
        Err(SyncError::Validation(ValidationError::EmptyComment))
    );

    let overlong = "a".repeat(1001);
    assert!(matches!(
        comments.add_comment(&overlong).await,
        Err(SyncError::Validation(ValidationError::CommentTooLong {
            len: 1001,
            ..
        }))
    ));

    assert!(comments.comments().is_empty());
    assert!(env
        .backend
        .comments_for(&"p1".to_string())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(env.notifier.errors().len(), 2);
}

#[tokio::test]
async fn a_comment_at_the_length_limit_is_accepted() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    let content = "a".repeat(1000);
    comments.add_comment(&content).await.unwrap();
    assert_eq!(comments.comments().len(), 1);
}

#[tokio::test]
async fn optimistic_placeholder_is_promoted_to_the_server_record_in_place() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    let gate = env.backend.hold_next();
    let task = {
        let comments = comments.clone();
        tokio::spawn(async move { comments.add_comment("hello").await })
    };

    gate.arrived().await;
    let pending = comments.comments();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].id.starts_with("temp-"));
    assert!(pending[0].is_optimistic);
    assert!(pending[0].is_pending);
    assert_eq!(
        pending[0].author.as_ref().map(|a| a.username.as_str()),
        Some("alice")
    );

    gate.release();
    let comment = task.await.unwrap().unwrap();
    assert_eq!(comment.id, "c-1");

    let settled = comments.comments();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].id, "c-1");
    assert!(!settled[0].is_optimistic);
    assert!(!settled[0].is_pending);
    // The placeholder's author display survives the promotion.
    assert_eq!(
        settled[0].author.as_ref().map(|a| a.username.as_str()),
        Some("alice")
    );
}

#[tokio::test]
async fn failed_comment_removes_exactly_its_placeholder() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    comments.add_comment("first").await.unwrap();

    env.backend
        .fail_next(StoreError::Unavailable("injected".to_string()));
    assert!(comments.add_comment("second").await.is_err());

    let list = comments.comments();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].content, "first");
    assert!(env
        .notifier
        .errors()
        .iter()
        .any(|m| m.contains("Failed to post comment")));
}

#[tokio::test]
async fn identical_submissions_in_quick_succession_settle_independently() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    // Same author, same content, twice: the temp id keeps the two apart.
    comments.add_comment("same text").await.unwrap();
    comments.add_comment("same text").await.unwrap();

    let list = comments.comments();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, "c-1");
    assert_eq!(list[1].id, "c-2");
}

#[tokio::test]
async fn server_id_arriving_via_both_paths_is_kept_once() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    let comment = comments.add_comment("hello").await.unwrap();

    // The realtime echo of the same insert.
    comments.add_realtime_comment(confirmed(&comment.id, "p1", "u1", "hello"));

    let list = comments.comments();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, comment.id);
}

#[tokio::test]
async fn echo_arriving_before_the_success_callback_leaves_a_single_entry() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    let gate = env.backend.hold_next();
    let task = {
        let comments = comments.clone();
        tokio::spawn(async move { comments.add_comment("hello").await })
    };
    gate.arrived().await;

    // The store will assign c-1; deliver its echo while the mutation is
    // still parked, so it lands before the success callback runs.
    comments.add_realtime_comment(confirmed("c-1", "p1", "u1", "hello"));
    assert_eq!(comments.comments().len(), 2);

    gate.release();
    task.await.unwrap().unwrap();

    let list = comments.comments();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "c-1");
}

#[tokio::test]
async fn sync_replaces_wholesale_when_no_mutation_is_in_flight() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    comments.add_realtime_comment(confirmed("c-9", "p1", "u9", "old view"));
    comments.sync_comments(vec![confirmed("c-1", "p1", "u2", "fresh view")]);

    let list = comments.comments();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "c-1");
}

#[tokio::test]
async fn sync_during_a_mutation_keeps_the_in_flight_placeholder() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    let gate = env.backend.hold_next();
    let task = {
        let comments = comments.clone();
        tokio::spawn(async move { comments.add_comment("hello").await })
    };
    gate.arrived().await;

    comments.sync_comments(vec![confirmed("c-7", "p1", "u-bob", "earlier comment")]);

    let merged = comments.comments();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].id, "c-7");
    assert!(merged[1].id.starts_with("temp-"));

    gate.release();
    task.await.unwrap().unwrap();

    let settled = comments.comments();
    assert_eq!(settled.len(), 2);
    assert_eq!(settled[0].id, "c-7");
    assert_eq!(settled[1].id, "c-1");
}

#[tokio::test]
async fn sync_drops_optimistic_entries_the_server_already_confirmed() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    let gate = env.backend.hold_next();
    let task = {
        let comments = comments.clone();
        tokio::spawn(async move { comments.add_comment("hello").await })
    };
    gate.arrived().await;

    // The poller saw a confirmed comment with the same author and content.
    comments.sync_comments(vec![confirmed("c-5", "p1", "u1", "hello")]);
    let merged = comments.comments();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "c-5");

    gate.release();
    task.await.unwrap().unwrap();

    // The settled insert is adopted; ids stay unique throughout.
    let settled = comments.comments();
    assert_eq!(settled.len(), 2);
    assert!(settled.iter().any(|c| c.id == "c-5"));
    assert!(settled.iter().any(|c| c.id == "c-1"));
    assert!(settled.iter().all(|c| !c.id.starts_with("temp-")));
}

#[tokio::test]
async fn realtime_insert_and_delete_merge_into_the_list() {
    let env = env();
    let (_alice_identity, alice) = signed_in("u-alice", "alice");
    let (_bob_identity, bob) = signed_in("u-bob", "bob");

    let alice_view = env.comments(&alice, "p1");
    let bob_view = env.comments(&bob, "p1");
    let _feed = alice_view.spawn_realtime(env.hub.subscribe(Topic::Comments("p1".to_string())));

    let comment = bob_view.add_comment("from bob").await.unwrap();
    eventually(
        || alice_view.comments().iter().any(|c| c.id == comment.id),
        "alice sees bob's comment",
    )
    .await;

    env.hub.publish(ChangeEvent::CommentDeleted {
        post_id: "p1".to_string(),
        comment_id: comment.id.clone(),
    });
    eventually(
        || alice_view.comments().is_empty(),
        "alice sees the deletion",
    )
    .await;
}

#[tokio::test]
async fn refresh_fills_author_profiles_out_of_band() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");

    env.backend.upsert_profile(
        &"u9".to_string(),
        AuthorProfile {
            username: "bob".to_string(),
            display_name: Some("Bob".to_string()),
            avatar_url: None,
        },
    );
    env.backend
        .insert_comment(NewComment {
            post_id: "p1".to_string(),
            author_id: "u9".to_string(),
            content: "from bob".to_string(),
        })
        .await
        .unwrap();

    let comments = env.comments(&session, "p1");
    comments.refresh().await.unwrap();

    let list = comments.comments();
    assert_eq!(list.len(), 1);
    assert_eq!(
        list[0].author.as_ref().map(|a| a.username.as_str()),
        Some("bob")
    );
}

#[tokio::test]
async fn poller_recovers_comments_the_channel_never_delivered() {
    let env = env();
    let (_identity, session) = signed_in("u1", "alice");
    let comments = env.comments(&session, "p1");

    // No realtime task attached; only the poller corrects the list.
    let _poller = comments.spawn_poller(Duration::from_millis(20));

    env.backend
        .insert_comment(NewComment {
            post_id: "p1".to_string(),
            author_id: "u9".to_string(),
            content: "missed by the channel".to_string(),
        })
        .await
        .unwrap();

    eventually(|| comments.comments().len() == 1, "poller catches up").await;
}

#[tokio::test]
async fn signed_out_comment_is_rejected() {
    let env = env();
    let (_identity, session) = signed_out();
    let comments = env.comments(&session, "p1");

    assert_eq!(
        comments.add_comment("hello").await,
        Err(SyncError::Validation(ValidationError::SignedOut))
    );
    assert!(comments.comments().is_empty());
}
