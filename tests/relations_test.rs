mod helpers;

use enhanced_cognee::memory::forget::forget_memory;
use enhanced_cognee::memory::relations::{link_memories, list_relations, neighbors};
use enhanced_cognee::memory::search::{inspect_memory, Direction};
use enhanced_cognee::memory::types::MemoryKind;
use helpers::{insert_memory, test_db, test_embedding};
use rusqlite::Connection;

fn entity(conn: &mut Connection, name: &str, seed: u16) -> String {
    insert_memory(conn, name, MemoryKind::Entity, "a", &test_embedding(seed))
}

#[test]
fn link_shows_up_on_both_ends() {
    let mut conn = test_db();
    let alice = entity(&mut conn, "Alice is a software engineer", 0);
    let acme = entity(&mut conn, "Acme Corp is a tech company", 100);

    let rel = link_memories(&conn, &alice, "works_at", &acme, 1.0).unwrap();
    assert!(!rel.deduplicated);

    let from_alice = inspect_memory(&conn, &alice, None, true, false).unwrap().relations.unwrap();
    assert_eq!(from_alice.len(), 1);
    assert_eq!(from_alice[0].relation, "works_at");
    assert_eq!(from_alice[0].direction, Direction::Outgoing);
    assert_eq!(from_alice[0].other.id, acme);

    let from_acme = inspect_memory(&conn, &acme, None, true, false).unwrap().relations.unwrap();
    assert_eq!(from_acme[0].direction, Direction::Incoming);
    assert_eq!(from_acme[0].other.id, alice);
}

#[test]
fn duplicate_links_are_idempotent() {
    let mut conn = test_db();
    let a = entity(&mut conn, "Entity A", 0);
    let b = entity(&mut conn, "Entity B", 100);

    let first = link_memories(&conn, &a, "knows", &b, 1.0).unwrap();
    let second = link_memories(&conn, &a, "knows", &b, 0.5).unwrap();
    assert!(second.deduplicated);
    assert_eq!(first.id, second.id);
    assert_eq!(list_relations(&conn, &a).unwrap().len(), 1);
}

#[test]
fn invalid_links_are_rejected() {
    let mut conn = test_db();
    let a = entity(&mut conn, "Entity A", 0);
    let b = entity(&mut conn, "Entity B", 100);

    assert!(link_memories(&conn, &a, "  ", &b, 1.0).is_err());
    assert!(link_memories(&conn, &a, "self", &a, 1.0).is_err());
    assert!(link_memories(&conn, &a, "knows", &b, 0.0).is_err());
    assert!(link_memories(&conn, &a, "knows", &b, f64::NAN).is_err());
    assert!(link_memories(&conn, &a, "knows", "ghost", 1.0).is_err());
}

#[test]
fn hard_delete_cascades_relations() {
    let mut conn = test_db();
    let a = entity(&mut conn, "Entity A", 0);
    let b = entity(&mut conn, "Entity B", 100);
    link_memories(&conn, &a, "knows", &b, 1.0).unwrap();

    forget_memory(&mut conn, &a, None, true).unwrap();

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memory_relations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn neighbors_walk_both_directions_up_to_depth() {
    let mut conn = test_db();
    let a = entity(&mut conn, "A", 1);
    let b = entity(&mut conn, "B", 2);
    let c = entity(&mut conn, "C", 3);
    let d = entity(&mut conn, "D", 4);

    link_memories(&conn, &a, "knows", &b, 1.0).unwrap();
    link_memories(&conn, &c, "reports_to", &b, 1.0).unwrap();
    link_memories(&conn, &c, "knows", &d, 1.0).unwrap();

    let one_hop = neighbors(&conn, &a, None, 1, None).unwrap();
    assert_eq!(one_hop.len(), 1);
    assert_eq!(one_hop[0].id, b);

    let three_hops = neighbors(&conn, &a, None, 3, None).unwrap();
    let depth_of = |id: &str| three_hops.iter().find(|n| n.id == id).map(|n| n.depth);
    assert_eq!(depth_of(&b), Some(1));
    assert_eq!(depth_of(&c), Some(2));
    assert_eq!(depth_of(&d), Some(3));
    assert_eq!(depth_of(&a), None);

    let via_c = three_hops.iter().find(|n| n.id == c).unwrap();
    assert_eq!(via_c.direction, Direction::Incoming);
    assert_eq!(via_c.via, b);

    let knows_only = neighbors(&conn, &a, None, 3, Some("knows")).unwrap();
    assert_eq!(knows_only.len(), 1);
}

#[test]
fn neighbors_skip_superseded_memories() {
    let mut conn = test_db();
    let a = entity(&mut conn, "A", 1);
    let b = entity(&mut conn, "B", 2);
    let c = entity(&mut conn, "C", 3);
    link_memories(&conn, &a, "knows", &b, 1.0).unwrap();
    link_memories(&conn, &b, "knows", &c, 1.0).unwrap();

    forget_memory(&mut conn, &b, None, false).unwrap();

    assert!(neighbors(&conn, &a, None, 3, None).unwrap().is_empty());
    assert!(neighbors(&conn, "ghost", None, 1, None).is_err());
}

#[test]
fn private_memories_stay_hidden_from_other_agents() {
    let mut conn = test_db();
    let project = entity(&mut conn, "Project Atlas kickoff", 0);
    let diary = insert_memory(
        &mut conn,
        "Alice felt the Atlas deadline is unrealistic",
        MemoryKind::Event,
        "alice",
        &test_embedding(1),
    );
    let milestone = entity(&mut conn, "Atlas milestone one", 2);
    link_memories(&conn, &diary, "about", &project, 1.0).unwrap();
    link_memories(&conn, &diary, "mentions", &milestone, 1.0).unwrap();

    // The private node is neither shown nor walked through.
    assert!(neighbors(&conn, &project, None, 2, None).unwrap().is_empty());
    assert!(neighbors(&conn, &project, Some("bob"), 2, None).unwrap().is_empty());

    let owner_view = neighbors(&conn, &project, Some("alice"), 2, None).unwrap();
    let ids: Vec<&str> = owner_view.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec![diary.as_str(), milestone.as_str()]);

    assert!(neighbors(&conn, &diary, Some("bob"), 1, None).is_err());

    assert!(inspect_memory(&conn, &diary, Some("bob"), false, false).is_err());
    assert!(inspect_memory(&conn, &diary, None, false, false).is_err());
    let own = inspect_memory(&conn, &diary, Some("alice"), true, false).unwrap();
    assert_eq!(own.relations.unwrap().len(), 2);

    let shared = inspect_memory(&conn, &project, Some("bob"), true, false).unwrap();
    assert!(shared.relations.unwrap().is_empty());
}
