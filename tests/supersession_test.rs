mod helpers;

use enhanced_cognee::llm::HeuristicCounter;
use enhanced_cognee::memory::search::{inspect_memory, recall_by_query, SearchFilter};
use enhanced_cognee::memory::store::store_memory;
use enhanced_cognee::memory::types::{MemoryKind, NewMemory};
use helpers::{insert_memory, search_config, similar_embedding, test_db, test_embedding, DEDUP_THRESHOLD};

#[test]
fn superseding_marks_the_old_memory() {
    let mut conn = test_db();
    let emb = test_embedding(0);
    let old = insert_memory(&mut conn, "API limit is 100 rpm", MemoryKind::Fact, "a", &emb);

    // A near-identical vector must not be absorbed by the memory it replaces.
    let new = store_memory(
        &mut conn,
        &NewMemory::new("API limit is 200 rpm", MemoryKind::Fact, "a").supersedes(&old),
        &similar_embedding(&emb),
        DEDUP_THRESHOLD,
    )
    .unwrap();

    assert!(!new.deduplicated);
    assert_eq!(new.superseded.as_deref(), Some(old.as_str()));

    let inspected = inspect_memory(&conn, &old, None, false, true).unwrap();
    assert_eq!(inspected.memory.superseded_by.as_deref(), Some(new.id.as_str()));
    assert!(inspected.log.unwrap().iter().any(|e| e.operation == "supersede"));
}

#[test]
fn superseded_memories_drop_out_of_recall() {
    let mut conn = test_db();
    let old = insert_memory(&mut conn, "office is on floor 3", MemoryKind::Fact, "a", &test_embedding(1));
    let new = store_memory(
        &mut conn,
        &NewMemory::new("office is on floor 5", MemoryKind::Fact, "a").supersedes(&old),
        &test_embedding(2),
        DEDUP_THRESHOLD,
    )
    .unwrap();

    let response = recall_by_query(
        &conn,
        &test_embedding(1),
        "office floor",
        &SearchFilter::default(),
        &search_config(5),
        &HeuristicCounter::default(),
    )
    .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![new.id.as_str()]);
}

#[test]
fn superseding_an_unknown_memory_fails_atomically() {
    let mut conn = test_db();
    let result = store_memory(
        &mut conn,
        &NewMemory::new("replacement", MemoryKind::Fact, "a").supersedes("no-such-id"),
        &test_embedding(3),
        DEDUP_THRESHOLD,
    );
    assert!(result.is_err());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
