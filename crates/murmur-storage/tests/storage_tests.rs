// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the SQLite storage adapter against a temp database.

use murmur_config::model::StorageConfig;
use murmur_core::types::{
    ConsolidatedMemory, ConsolidationRun, Entity, EntityType, MemoryCategory, Message,
    MessageRole, PersistentMemory, Session, SessionState, SnippetKind,
};
use murmur_core::{MurmurError, StorageAdapter};
use murmur_storage::SqliteStorage;

async fn storage() -> (tempfile::TempDir, SqliteStorage) {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("murmur.db").to_str().unwrap().to_string(),
        wal_mode: true,
    };
    let storage = SqliteStorage::new(config);
    storage.initialize().await.unwrap();
    (dir, storage)
}

fn ts(minute: u32) -> String {
    format!("2026-03-01T10:{minute:02}:00.000Z")
}

fn session(id: &str, user: &str, at: &str) -> Session {
    Session {
        id: id.into(),
        user_id: user.into(),
        state: SessionState::Active,
        started_at: at.into(),
        last_activity_at: at.into(),
        idled_at: None,
        closed_at: None,
        message_count: 0,
    }
}

fn message(id: &str, user: &str, session: &str, content: &str, at: &str) -> Message {
    Message {
        id: id.into(),
        user_id: user.into(),
        session_id: session.into(),
        role: MessageRole::User,
        content: content.into(),
        created_at: at.into(),
        importance_score: 0.5,
        consolidated_at: None,
        consolidated_summary_id: None,
    }
}

#[tokio::test]
async fn one_active_session_per_user() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();

    let err = s
        .create_session(&session("s2", "alice", &ts(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::Validation(_)));

    // Another user is unaffected.
    s.create_session(&session("s3", "bob", &ts(1))).await.unwrap();
    assert_eq!(s.count_active_sessions().await.unwrap(), 2);

    let active = s.get_active_session_for_user("alice").await.unwrap().unwrap();
    assert_eq!(active.id, "s1");
}

#[tokio::test]
async fn idle_sweep_and_reactivation() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    s.create_session(&session("s2", "bob", &ts(20))).await.unwrap();

    let idled = s.mark_idle_sessions(&ts(10), &ts(30)).await.unwrap();
    assert_eq!(idled.len(), 1);
    assert_eq!(idled[0].id, "s1");
    assert_eq!(idled[0].state, SessionState::Idle);
    assert_eq!(idled[0].idled_at.as_deref(), Some(ts(30).as_str()));

    // Touch only applies to active sessions.
    assert!(!s.touch_active_session("s1", &ts(31)).await.unwrap());
    assert!(s.touch_active_session("s2", &ts(31)).await.unwrap());

    let idle = s.get_latest_idle_session_for_user("alice").await.unwrap().unwrap();
    assert_eq!(idle.id, "s1");
    assert!(s.reactivate_session("s1", &ts(32)).await.unwrap());
    // Second reactivation is a no-op.
    assert!(!s.reactivate_session("s1", &ts(33)).await.unwrap());

    let back = s.get_session("s1").await.unwrap().unwrap();
    assert_eq!(back.state, SessionState::Active);
    assert_eq!(back.last_activity_at, ts(32));
}

#[tokio::test]
async fn reactivation_refused_while_another_session_is_active() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    s.mark_idle_sessions(&ts(10), &ts(10)).await.unwrap();
    s.create_session(&session("s2", "alice", &ts(11))).await.unwrap();

    assert!(!s.reactivate_session("s1", &ts(12)).await.unwrap());
}

#[tokio::test]
async fn closed_is_terminal() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    assert!(s.close_session("s1", &ts(1)).await.unwrap());
    assert!(!s.close_session("s1", &ts(2)).await.unwrap());
    assert!(!s.reactivate_session("s1", &ts(3)).await.unwrap());
    assert!(!s.touch_active_session("s1", &ts(3)).await.unwrap());

    let err = s
        .append_message(&message("m1", "alice", "s1", "hello", &ts(4)))
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::NotFound { .. }));

    let err = s.close_session("nope", &ts(1)).await.unwrap_err();
    assert!(matches!(err, MurmurError::NotFound { .. }));

    let closed = s.get_session("s1").await.unwrap().unwrap();
    assert_eq!(closed.state, SessionState::Closed);
    assert_eq!(closed.closed_at.as_deref(), Some(ts(1).as_str()));
}

#[tokio::test]
async fn append_updates_session_and_preserves_order() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    for (i, text) in ["one", "two", "three"].iter().enumerate() {
        s.append_message(&message(&format!("m{i}"), "alice", "s1", text, &ts(5)))
            .await
            .unwrap();
    }

    let recent = s.recent_messages("s1", 2).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["two", "three"]);

    let sess = s.get_session("s1").await.unwrap().unwrap();
    assert_eq!(sess.message_count, 3);
    assert_eq!(sess.last_activity_at, ts(5));
}

#[tokio::test]
async fn repeated_append_of_one_message_is_counted_once() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    let m = message("m1", "alice", "s1", "hello", &ts(1));
    s.append_message(&m).await.unwrap();
    s.append_message(&m).await.unwrap();

    let sess = s.get_session("s1").await.unwrap().unwrap();
    assert_eq!(sess.message_count, 1);
    assert_eq!(s.recent_messages("s1", 10).await.unwrap().len(), 1);

    s.create_session(&session("s2", "bob", &ts(0))).await.unwrap();
    let err = s
        .append_message(&message("m1", "bob", "s2", "taken", &ts(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::Validation(_)));
    assert_eq!(s.get_session("s2").await.unwrap().unwrap().message_count, 0);
}

#[tokio::test]
async fn append_to_idle_session_resumes_it() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    s.mark_idle_sessions(&ts(10), &ts(10)).await.unwrap();

    s.append_message(&message("m1", "alice", "s1", "still here", &ts(11)))
        .await
        .unwrap();

    let sess = s.get_session("s1").await.unwrap().unwrap();
    assert_eq!(sess.state, SessionState::Active);
    assert_eq!(sess.idled_at, None);
    assert_eq!(sess.last_activity_at, ts(11));
}

#[tokio::test]
async fn append_to_superseded_idle_session_is_rejected() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    s.mark_idle_sessions(&ts(10), &ts(10)).await.unwrap();
    s.create_session(&session("s2", "alice", &ts(11))).await.unwrap();

    let err = s
        .append_message(&message("m1", "alice", "s1", "late", &ts(12)))
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::Validation(_)));

    let old = s.get_session("s1").await.unwrap().unwrap();
    assert_eq!(old.state, SessionState::Idle);
    assert_eq!(old.message_count, 0);
    assert!(s.get_message("m1").await.unwrap().is_none());
}

#[tokio::test]
async fn keyword_search_is_user_scoped_and_skips_consolidated() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    s.create_session(&session("s2", "bob", &ts(0))).await.unwrap();
    s.append_message(&message("m1", "alice", "s1", "dentist appointment friday", &ts(1)))
        .await
        .unwrap();
    s.append_message(&message("m2", "alice", "s1", "grocery list", &ts(2)))
        .await
        .unwrap();
    s.append_message(&message("m3", "bob", "s2", "dentist for bob", &ts(3)))
        .await
        .unwrap();

    let hits = s.keyword_search("alice", "dentist", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "m1");
    assert_eq!(hits[0].kind, SnippetKind::Message);

    let summary = ConsolidatedMemory {
        id: "c1".into(),
        user_id: "alice".into(),
        content: "Alice has a dentist appointment".into(),
        source_message_ids: vec!["m1".into()],
        period_start: ts(1),
        period_end: ts(1),
        created_at: ts(40),
    };
    assert_eq!(s.commit_consolidation(&summary, &ts(40)).await.unwrap(), 1);

    let hits = s.keyword_search("alice", "dentist", 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["c1"]);
    assert_eq!(hits[0].kind, SnippetKind::Summary);

    let snippets = s
        .get_snippets("alice", &["m1".into(), "m2".into(), "c1".into(), "m3".into()])
        .await
        .unwrap();
    let mut ids: Vec<&str> = snippets.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["c1", "m2"]);
}

#[tokio::test]
async fn messages_are_consolidated_at_most_once() {
    let (_dir, s) = storage().await;
    s.create_session(&session("s1", "alice", &ts(0))).await.unwrap();
    for i in 0..3 {
        s.append_message(&message(&format!("m{i}"), "alice", "s1", "text", &ts(i + 1)))
            .await
            .unwrap();
    }
    assert_eq!(
        s.users_with_eligible_messages(&ts(30)).await.unwrap(),
        vec!["alice".to_string()]
    );
    let eligible = s.eligible_for_consolidation("alice", &ts(30), 10).await.unwrap();
    assert_eq!(eligible.len(), 3);

    let summary = |id: &str| ConsolidatedMemory {
        id: id.into(),
        user_id: "alice".into(),
        content: "summary".into(),
        source_message_ids: vec!["m0".into(), "m1".into()],
        period_start: ts(1),
        period_end: ts(2),
        created_at: ts(40),
    };
    assert_eq!(s.commit_consolidation(&summary("c1"), &ts(40)).await.unwrap(), 2);
    // Same sources again: nothing left to mark, and no summary is written.
    assert_eq!(s.commit_consolidation(&summary("c2"), &ts(41)).await.unwrap(), 0);
    assert!(s.get_snippets("alice", &["c2".into()]).await.unwrap().is_empty());

    let m0 = s.get_message("m0").await.unwrap().unwrap();
    assert_eq!(m0.consolidated_summary_id.as_deref(), Some("c1"));
    let remaining = s.eligible_for_consolidation("alice", &ts(30), 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "m2");
}

#[tokio::test]
async fn consolidation_runs_are_listed_newest_first() {
    let (_dir, s) = storage().await;
    for (i, user) in ["alice", "bob", "alice"].iter().enumerate() {
        s.insert_consolidation_run(&ConsolidationRun {
            id: format!("r{i}"),
            user_id: (*user).into(),
            cutoff_date: ts(0),
            messages_consolidated: 10,
            summaries_created: 1,
            tokens_saved_estimate: 100,
            run_at: ts(i as u32 + 1),
        })
        .await
        .unwrap();
    }
    let alice = s.list_consolidation_runs(Some("alice"), 10).await.unwrap();
    let ids: Vec<&str> = alice.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r2", "r0"]);
    assert_eq!(s.list_consolidation_runs(None, 2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn top_memories_by_importance_then_recency() {
    let (_dir, s) = storage().await;
    let memory = |id: &str, importance: u8, at: &str| PersistentMemory {
        id: id.into(),
        user_id: "alice".into(),
        category: MemoryCategory::Fact,
        content: format!("fact {id}"),
        importance,
        tags: vec!["t".into()],
        session_id: None,
        created_at: at.into(),
        active: true,
    };
    s.insert_memory(&memory("low", 2, &ts(5))).await.unwrap();
    s.insert_memory(&memory("high-old", 9, &ts(1))).await.unwrap();
    s.insert_memory(&memory("high-new", 9, &ts(2))).await.unwrap();

    let top = s.top_memories("alice", 2).await.unwrap();
    let ids: Vec<&str> = top.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["high-new", "high-old"]);
    assert_eq!(top[0].tags, vec!["t".to_string()]);

    assert!(s.deactivate_memory("high-new").await.unwrap());
    assert!(!s.deactivate_memory("high-new").await.unwrap());
    assert_eq!(s.list_active_memories("alice").await.unwrap().len(), 2);
    assert!(!s.get_memory("high-new").await.unwrap().unwrap().active);
}

#[tokio::test]
async fn entity_surface_forms_accumulate() {
    let (_dir, s) = storage().await;
    s.insert_entity(&Entity {
        id: "e1".into(),
        user_id: "alice".into(),
        entity_type: EntityType::Person,
        canonical_name: "Dr. Smith".into(),
        surface_forms: vec!["Dr. Smith".into()],
        confidence: 0.7,
        first_seen_at: ts(0),
        last_seen_at: ts(0),
    })
    .await
    .unwrap();

    s.add_surface_form("e1", "Doctor Smith", 0.9, &ts(5)).await.unwrap();
    // Case variant of an existing form is not added twice.
    s.add_surface_form("e1", "dr. smith", 0.5, &ts(6)).await.unwrap();

    let e = s.get_entity("e1").await.unwrap().unwrap();
    assert_eq!(e.surface_forms, vec!["Dr. Smith".to_string(), "Doctor Smith".to_string()]);
    assert!((e.confidence - 0.9).abs() < 1e-9);
    assert_eq!(e.last_seen_at, ts(6));

    assert_eq!(s.list_entities("alice", Some(EntityType::Place)).await.unwrap().len(), 0);
    assert_eq!(s.list_entities("alice", None).await.unwrap().len(), 1);

    let err = s.add_surface_form("nope", "x", 0.5, &ts(7)).await.unwrap_err();
    assert!(matches!(err, MurmurError::NotFound { .. }));

    assert!(s.delete_entity("e1").await.unwrap());
    assert!(s.get_entity("e1").await.unwrap().is_none());
}
