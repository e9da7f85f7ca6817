mod helpers;

use enhanced_cognee::config::MaintenanceConfig;
use enhanced_cognee::embedding::hashing::HashingEmbeddingProvider;
use enhanced_cognee::llm::{ExtractiveSummarizer, HeuristicCounter};
use enhanced_cognee::memory::maintenance::{apply_decay, cleanup_stale, compact_events};
use enhanced_cognee::memory::search::inspect_memory;
use enhanced_cognee::memory::types::{MemoryKind, Visibility};
use helpers::{insert_memory, test_db, test_embedding};
use rusqlite::{params, Connection};

fn backdate(conn: &Connection, id: &str, when: &str) {
    conn.execute(
        "UPDATE memories SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![when, id],
    )
    .unwrap();
}

fn confidence(conn: &Connection, id: &str) -> f64 {
    conn.query_row("SELECT confidence FROM memories WHERE id = ?1", [id], |r| r.get(0))
        .unwrap()
}

#[test]
fn decay_uses_the_event_factor_for_events() {
    let mut conn = test_db();
    let fact = insert_memory(&mut conn, "fact", MemoryKind::Fact, "a", &test_embedding(0));
    let event = insert_memory(&mut conn, "event", MemoryKind::Event, "a", &test_embedding(1));

    let config = MaintenanceConfig::default();
    let result = apply_decay(&conn, &config).unwrap();

    assert_eq!(result.affected_by_kind["fact"], 1);
    assert_eq!(result.affected_by_kind["event"], 1);
    assert_eq!(result.affected_by_kind["procedure"], 0);
    assert!((confidence(&conn, &fact) - config.decay_factor).abs() < 1e-9);
    assert!((confidence(&conn, &event) - config.event_decay_factor).abs() < 1e-9);

    let batches: i64 = conn
        .query_row("SELECT COUNT(*) FROM memory_log WHERE operation = 'decay'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(batches, 2);
}

#[test]
fn cleanup_dry_run_reports_without_deleting() {
    let mut conn = test_db();
    let stale = insert_memory(&mut conn, "stale and weak", MemoryKind::Fact, "a", &test_embedding(0));
    let fresh = insert_memory(&mut conn, "fresh but weak", MemoryKind::Fact, "a", &test_embedding(1));
    let strong = insert_memory(&mut conn, "old but strong", MemoryKind::Fact, "a", &test_embedding(2));

    conn.execute("UPDATE memories SET confidence = 0.01 WHERE id IN (?1, ?2)", params![stale, fresh])
        .unwrap();
    backdate(&conn, &stale, "2020-01-01T00:00:00+00:00");
    backdate(&conn, &strong, "2020-01-01T00:00:00+00:00");

    let config = MaintenanceConfig::default();
    let preview = cleanup_stale(&mut conn, &config, true).unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.deleted, 0);
    let ids: Vec<&str> = preview.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![stale.as_str()]);
    assert!(inspect_memory(&conn, &stale, None, false, false).is_ok());

    let done = cleanup_stale(&mut conn, &config, false).unwrap();
    assert_eq!(done.deleted, 1);
    assert!(inspect_memory(&conn, &stale, None, false, false).is_err());
    assert!(inspect_memory(&conn, &fresh, None, false, false).is_ok());
    assert!(inspect_memory(&conn, &strong, None, false, false).is_ok());
}

#[test]
fn compaction_replaces_a_week_of_events_with_a_summary() {
    let mut conn = test_db();
    let days = ["02", "03", "04", "05", "06"];
    let mut originals = Vec::new();
    for (i, day) in days.iter().enumerate() {
        let id = insert_memory(
            &mut conn,
            &format!("Deployed release {i} of the billing service to production."),
            MemoryKind::Event,
            "ops",
            &test_embedding(10 + i as u16),
        );
        backdate(&conn, &id, &format!("2024-01-{day}T09:00:00+00:00"));
        originals.push(id);
    }
    // Different agent, same week: not enough events to form a group.
    let other = insert_memory(&mut conn, "Reviewed a pull request.", MemoryKind::Event, "dev", &test_embedding(40));
    backdate(&conn, &other, "2024-01-03T09:00:00+00:00");

    let embedder = HashingEmbeddingProvider::new();
    let summarizer = ExtractiveSummarizer::new(HeuristicCounter::default());
    let result = compact_events(&mut conn, &embedder, &summarizer, &MaintenanceConfig::default()).unwrap();

    assert_eq!(result.groups_compacted, 1);
    assert_eq!(result.memories_compacted, 5);
    let summary_id = &result.summary_ids[0];

    let summary = inspect_memory(&conn, summary_id, Some("ops"), false, false).unwrap().memory;
    assert_eq!(summary.kind, MemoryKind::Event);
    assert_eq!(summary.agent_id, "ops");
    assert_eq!(summary.visibility, Visibility::Private);
    let metadata = summary.metadata.unwrap();
    assert_eq!(metadata["summary"], true);
    assert_eq!(metadata["source_count"], 5);
    assert!(summary.content.contains("billing service"));

    for id in &originals {
        let m = inspect_memory(&conn, id, Some("ops"), false, false).unwrap().memory;
        assert_eq!(m.superseded_by.as_deref(), Some(summary_id.as_str()));
    }
    let untouched = inspect_memory(&conn, &other, Some("dev"), false, false).unwrap().memory;
    assert!(untouched.superseded_by.is_none());
}
