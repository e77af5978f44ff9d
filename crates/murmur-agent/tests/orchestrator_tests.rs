// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the session lifecycle and the memory façade.

use std::sync::Arc;
use std::time::Duration;

use murmur_agent::{
    Collaborators, MemoryOrchestrator, NewMemory, SessionOrigin, spawn_idle_sweeper,
};
use murmur_core::MurmurError;
use murmur_core::types::{EntityType, MemoryCategory, MessageRole, SessionState};
use murmur_resilience::{CircuitState, Dependency};
use murmur_test_utils::TestHarness;

fn collaborators(h: &TestHarness) -> Collaborators {
    Collaborators {
        storage: h.storage(),
        vectors: h.vectors(),
        cache: h.cache(),
        provider: h.provider(),
        embedder: h.embedder(),
        transcriber: Some(h.transcriber()),
        synthesizer: Some(h.synthesizer()),
        clock: h.clock(),
    }
}

fn orchestrator(h: &TestHarness) -> MemoryOrchestrator {
    MemoryOrchestrator::with_breakers(collaborators(h), h.config.clone(), Arc::clone(&h.breakers))
        .unwrap()
}

// --- Session lifecycle ---

#[tokio::test]
async fn turns_reuse_then_reactivate_then_replace_session() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    // Three turns within five minutes share one session.
    let first = core.handle_turn("alice", None, "hello").await.unwrap();
    assert_eq!(first.session_origin, SessionOrigin::Created);
    let session_id = first.session_id.clone();
    for text in ["one", "two", "three"] {
        let turn = core.handle_turn("alice", None, text).await.unwrap();
        assert_eq!(turn.session_id, session_id);
        core.record_turn(&session_id, MessageRole::User, text).await.unwrap();
        h.advance_minutes(2);
    }
    let session = h.storage().get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.message_count, 3);

    // Quiet for 35 minutes: the sweep idles it.
    h.advance_minutes(35);
    assert_eq!(core.sweep_idle().await.unwrap(), 1);
    let session = h.storage().get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Idle);

    // Back after 8 minutes: same session.
    h.advance_minutes(8);
    let turn = core.handle_turn("alice", None, "I'm back").await.unwrap();
    assert_eq!(turn.session_id, session_id);
    assert_eq!(turn.session_origin, SessionOrigin::Reactivated);

    // Idle again, back after 12 minutes: new session.
    h.advance_minutes(31);
    assert_eq!(core.sweep_idle().await.unwrap(), 1);
    h.advance_minutes(12);
    let turn = core.handle_turn("alice", None, "hello again").await.unwrap();
    assert_ne!(turn.session_id, session_id);
    assert_eq!(turn.session_origin, SessionOrigin::Created);
    assert_eq!(h.storage().count_active_sessions().await.unwrap(), 1);
}

#[tokio::test]
async fn reactivation_window_boundary() {
    let h = TestHarness::new().await.unwrap();
    let sessions = orchestrator(&h);
    let manager = sessions.sessions();
    let window = h.config.session.reactivation_window_secs as i64;

    let original = manager.get_or_create_session("bob").await.unwrap();
    h.advance_minutes(31);
    manager.sweep_idle(Duration::from_secs(30 * 60)).await.unwrap();
    h.manual_clock.advance(chrono::Duration::seconds(window - 1));
    assert_eq!(manager.get_or_create_session("bob").await.unwrap().id, original.id);

    h.advance_minutes(31);
    manager.sweep_idle(Duration::from_secs(30 * 60)).await.unwrap();
    h.manual_clock.advance(chrono::Duration::seconds(window + 1));
    assert_ne!(manager.get_or_create_session("bob").await.unwrap().id, original.id);
}

#[tokio::test]
async fn closed_session_is_never_reused() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    let first = core.handle_turn("carol", None, "hi").await.unwrap();
    assert!(core.close_session(&first.session_id).await.unwrap());
    assert!(!core.close_session(&first.session_id).await.unwrap());

    let next = core
        .handle_turn("carol", Some(&first.session_id), "hi again")
        .await
        .unwrap();
    assert_ne!(next.session_id, first.session_id);

    let err = core
        .record_turn(&first.session_id, MessageRole::User, "late")
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::Validation(_)));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    let err = core.record_turn("missing", MessageRole::User, "hi").await.unwrap_err();
    assert!(matches!(err, MurmurError::NotFound { .. }));
    let err = core.close_session("missing").await.unwrap_err();
    assert!(matches!(err, MurmurError::NotFound { .. }));
    assert!(matches!(
        core.sessions().touch("missing").await.unwrap_err(),
        MurmurError::NotFound { .. }
    ));
}

#[tokio::test]
async fn concurrent_first_turns_share_one_session() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    let (a, b, c) = tokio::join!(
        core.handle_turn("dave", None, "a"),
        core.handle_turn("dave", None, "b"),
        core.handle_turn("dave", None, "c"),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a.session_id, b.session_id);
    assert_eq!(b.session_id, c.session_id);
    assert_eq!(h.storage().count_active_sessions().await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_records_keep_arrival_count() {
    let h = TestHarness::new().await.unwrap();
    let core = Arc::new(orchestrator(&h));
    let session_id = core.handle_turn("erin", None, "start").await.unwrap().session_id;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let core = Arc::clone(&core);
        let session_id = session_id.clone();
        tasks.push(tokio::spawn(async move {
            core.record_turn(&session_id, MessageRole::User, &format!("turn {i}"))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let session = h.storage().get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.message_count, 10);
}

#[tokio::test]
async fn write_stalled_past_the_store_timeout_is_stored_once() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.breaker.db.call_timeout_ms = 300;
            c.breaker.db.failure_threshold = 3;
            c.write_retry.max_attempts = 3;
            c.write_retry.base_delay_ms = 400;
            c.write_retry.max_delay_ms = 2_000;
        })
        .build()
        .await
        .unwrap();
    let core = orchestrator(&h);
    let session_id = core.handle_turn("fred", None, "hi").await.unwrap().session_id;

    // Another connection holds the write lock for longer than one store call
    // may take, so the first attempt times out but still commits later.
    let path = h.config.storage.database_path.clone();
    let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
    let holder = tokio::task::spawn_blocking(move || {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch("BEGIN EXCLUSIVE;").unwrap();
        locked_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(1_000));
        conn.execute_batch("COMMIT;").unwrap();
    });
    locked_rx.await.unwrap();

    let message = core
        .record_turn(&session_id, MessageRole::User, "remember the blue door")
        .await
        .unwrap();
    holder.await.unwrap();

    let stored = h.storage().get_message(&message.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "remember the blue door");
    let session = h.storage().get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.message_count, 1);
    assert_eq!(h.storage().recent_messages(&session_id, 10).await.unwrap().len(), 1);

    let db = h.breakers.get(Dependency::Db).snapshot();
    assert_eq!(db.state, CircuitState::Closed);
    assert_eq!(db.consecutive_failures, 0);
}

#[tokio::test]
async fn writing_to_a_swept_session_keeps_it_current() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);
    let session_id = core.handle_turn("gina", None, "hi").await.unwrap().session_id;

    h.advance_minutes(35);
    assert_eq!(core.sweep_idle().await.unwrap(), 1);
    core.record_turn(&session_id, MessageRole::Assistant, "still answering")
        .await
        .unwrap();

    let session = h.storage().get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Active);
    assert_eq!(session.idled_at, None);

    // Long after the reactivation window measured from the sweep.
    h.advance_minutes(15);
    let next = core.handle_turn("gina", None, "and another").await.unwrap();
    assert_eq!(next.session_id, session_id);
    assert_eq!(next.session_origin, SessionOrigin::Existing);
}

#[tokio::test]
async fn sweep_keeps_the_write_lock_a_writer_holds() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);
    let session_id = core.handle_turn("ivan", None, "hi").await.unwrap().session_id;
    let manager = core.sessions();

    let held = manager.session_lock(&session_id);
    let _writing = held.lock().await;
    h.advance_minutes(35);
    assert_eq!(core.sweep_idle().await.unwrap(), 1);

    let next_writer = manager.session_lock(&session_id);
    assert!(Arc::ptr_eq(&held, &next_writer));
    assert!(next_writer.try_lock().is_err());
}

#[tokio::test]
async fn swept_session_superseded_by_a_new_one_rejects_writes() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);
    let old = core.handle_turn("hana", None, "hi").await.unwrap().session_id;

    h.advance_minutes(35);
    core.sweep_idle().await.unwrap();
    h.advance_minutes(20);
    let new = core.handle_turn("hana", None, "back").await.unwrap().session_id;
    assert_ne!(old, new);

    let err = core
        .record_turn(&old, MessageRole::User, "late")
        .await
        .unwrap_err();
    assert!(matches!(err, MurmurError::Validation(_)));
    let session = h.storage().get_session(&old).await.unwrap().unwrap();
    assert_eq!(session.state, SessionState::Idle);
}

// --- Context and enrichment ---

#[tokio::test]
async fn recorded_exchange_is_enriched_and_retrievable() {
    let h = TestHarness::new().await.unwrap();
    h.mock_provider
        .respond_when(
            "named entities",
            r#"[{"text":"Dr. Smith","type":"PERSON","confidence":0.9,"context":"see Dr. Smith"}]"#,
        )
        .await;
    h.mock_provider
        .respond_when(
            "Extract facts",
            r#"[{"category":"schedule","content":"Dentist appointment with Dr. Smith on Friday","importance":7,"tags":["health"]}]"#,
        )
        .await;
    let core = orchestrator(&h);

    let turn = core.handle_turn("alice", None, "I see Dr. Smith on Friday").await.unwrap();
    assert!(turn.context.short_term.is_empty());
    core.record_turn(&turn.session_id, MessageRole::User, "I see Dr. Smith on Friday for the dentist")
        .await
        .unwrap();
    core.record_turn(&turn.session_id, MessageRole::Assistant, "Got it, dentist on Friday.")
        .await
        .unwrap();
    core.wait_for_enrichment().await;

    let entities = core.list_entities("alice", Some(EntityType::Person)).await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].canonical_name, "Dr. Smith");

    let facts = core.get_persistent_memories("alice", 10).await.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].category, MemoryCategory::Schedule);

    let next = core.handle_turn("alice", None, "when is the dentist").await.unwrap();
    assert!(!next.degraded);
    assert_eq!(next.context.short_term.len(), 2);
    assert_eq!(next.context.short_term[0].role, MessageRole::User);
    assert!(!next.context.long_term.is_empty());
    assert_eq!(next.context.facts.len(), 1);
}

#[tokio::test]
async fn failing_dependencies_degrade_but_never_fail_the_turn() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);
    let session_id = core.handle_turn("frank", None, "hi").await.unwrap().session_id;
    core.record_turn(&session_id, MessageRole::User, "remember the blue car").await.unwrap();
    core.wait_for_enrichment().await;

    h.mock_embedder.set_failing(true);
    h.mock_provider.set_failing(true);
    core.record_turn(&session_id, MessageRole::Assistant, "the blue car, noted")
        .await
        .unwrap();
    core.wait_for_enrichment().await;

    let turn = core.handle_turn("frank", None, "blue car").await.unwrap();
    assert!(turn.degraded);
    assert_eq!(turn.context.short_term.len(), 2);
    assert!(!turn.context.long_term.is_empty());
}

#[tokio::test]
async fn full_queue_drops_jobs_without_failing_turns() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.worker.workers = 1;
            c.worker.queue_capacity = 1;
        })
        .build()
        .await
        .unwrap();
    h.mock_embedder.set_delay(Duration::from_millis(200));
    let core = orchestrator(&h);
    let session_id = core.handle_turn("gina", None, "hi").await.unwrap().session_id;

    for i in 0..3 {
        core.record_turn(&session_id, MessageRole::User, &format!("message {i}"))
            .await
            .unwrap();
    }
    assert!(core.status().await.enrichment.dropped >= 1);
    core.wait_for_enrichment().await;
    assert_eq!(core.status().await.enrichment.pending, 0);
}

// --- Memories, entities, speech, status ---

#[tokio::test]
async fn manual_memories_are_clamped_and_soft_deleted() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    let memory = core
        .add_memory(NewMemory {
            user_id: "hank".into(),
            category: "hobby".into(),
            content: "  Plays the cello  ".into(),
            importance: 42,
            tags: vec!["Music".into(), " ".into()],
            session_id: None,
        })
        .await
        .unwrap();
    assert_eq!(memory.category, MemoryCategory::Other);
    assert_eq!(memory.importance, 10);
    assert_eq!(memory.content, "Plays the cello");
    assert_eq!(memory.tags, vec!["music".to_string()]);

    assert!(core.forget_memory(&memory.id).await.unwrap());
    assert!(!core.forget_memory(&memory.id).await.unwrap());
    assert!(core.get_persistent_memories("hank", 10).await.unwrap().is_empty());
    assert!(matches!(
        core.forget_memory("missing").await.unwrap_err(),
        MurmurError::NotFound { .. }
    ));

    let empty = core
        .add_memory(NewMemory {
            user_id: "hank".into(),
            content: "   ".into(),
            ..NewMemory::default()
        })
        .await;
    assert!(matches!(empty, Err(MurmurError::Validation(_))));
}

#[tokio::test]
async fn entity_admin_round_trip() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    let id = core.resolve_entity("ivy", "Lisbon", EntityType::Place).await.unwrap();
    assert_eq!(core.list_entities("ivy", None).await.unwrap().len(), 1);
    core.delete_entity(&id).await.unwrap();
    assert!(core.list_entities("ivy", None).await.unwrap().is_empty());
    assert!(matches!(
        core.delete_entity(&id).await.unwrap_err(),
        MurmurError::NotFound { .. }
    ));
}

#[tokio::test]
async fn speech_calls_pass_through_their_breakers() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);

    let heard = core.transcribe(b"good morning".to_vec()).await.unwrap();
    assert_eq!(heard.text, "good morning");
    let audio = core.synthesize("hello", "alto").await.unwrap();
    assert_eq!(audio, b"alto:hello".to_vec());

    h.mock_transcriber.set_failing(true);
    let err = core.transcribe(b"x".to_vec()).await.unwrap_err();
    assert!(matches!(err, MurmurError::DependencyUnavailable { .. }));

    let mut bare = collaborators(&h);
    bare.transcriber = None;
    let core = MemoryOrchestrator::new(bare, h.config.clone()).unwrap();
    assert!(matches!(
        core.transcribe(b"x".to_vec()).await.unwrap_err(),
        MurmurError::DependencyUnavailable { .. }
    ));
}

#[tokio::test]
async fn status_reports_store_and_breakers() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);
    core.handle_turn("jack", None, "hi").await.unwrap();

    let status = core.status().await;
    assert!(status.healthy);
    assert!(status.store.reachable);
    assert_eq!(status.active_sessions, Some(1));
    assert_eq!(status.breakers.len(), 5);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["breakers"][4]["dependency"], "db");
    assert_eq!(json["breakers"][4]["state"], "closed");
}

#[tokio::test]
async fn consolidation_runs_through_the_facade() {
    let h = TestHarness::new().await.unwrap();
    let core = orchestrator(&h);
    let runs = core.run_consolidation(Some("kate"), None).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].messages_consolidated, 0);
    assert_eq!(core.list_consolidation_runs(Some("kate"), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn background_sweeper_stops_on_shutdown() {
    let h = TestHarness::new().await.unwrap();
    let core = Arc::new(orchestrator(&h));
    let handle = spawn_idle_sweeper(Arc::clone(&core));

    core.shutdown(Duration::from_secs(1)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
