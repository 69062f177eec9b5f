//! End-to-end builds against the in-memory store.

mod helpers;

use helpers::{builder, test_config, CharBucketEmbedder, TEST_DIM, TIGER_BATCH};
use mythograph_rs::driver::{GraphStore, MemoryStore};
use mythograph_rs::resolution::{PhaseStats, ResolutionOutcome};
use mythograph_rs::schema::{EntityKind, IngestionBatch, RelationKind};
use mythograph_rs::{GraphBuilder, MythographError};

fn tiger_batch() -> IngestionBatch {
    IngestionBatch::from_json_str(TIGER_BATCH).unwrap()
}

async fn snapshot(store: &MemoryStore) -> (Vec<(EntityKind, String, Option<String>, Vec<String>)>, usize) {
    let nodes = store
        .list_nodes(None)
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.kind, n.name, n.description, n.aliases))
        .collect();
    (nodes, store.list_edges().await.unwrap().len())
}

#[tokio::test]
async fn build_writes_nodes_edges_and_vectors() {
    let builder = builder(MemoryStore::new());
    let report = builder.build(&tiger_batch()).await.unwrap();

    assert_eq!(report.nodes, 4);
    assert_eq!(report.edges, 3);
    assert_eq!(report.embeddings, 4);
    assert!(!report.degraded_resolution);
    assert_eq!(
        report.resolution,
        Some(ResolutionOutcome::Completed {
            exact: PhaseStats::default(),
            fuzzy: PhaseStats::default(),
        })
    );

    let store = builder.store();
    let spec = store.vector_index("entity_index").await.unwrap().unwrap();
    assert_eq!(spec.dimensions, TEST_DIM);
    assert_eq!(spec.label, "__Entity__");

    for node in store.list_nodes(None).await.unwrap() {
        let vector = store.vector(&node.id, "embedding").await.unwrap();
        assert_eq!(vector.len(), TEST_DIM);
    }

    let myth_edges: Vec<_> = store
        .list_edges()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == RelationKind::GeneratesMyth)
        .collect();
    assert_eq!(myth_edges.len(), 2);
    assert!(myth_edges
        .iter()
        .all(|e| e.description.as_deref() == Some("Power and authority read as natural rule")));
}

#[tokio::test]
async fn building_twice_changes_nothing() {
    let builder = builder(MemoryStore::new());
    builder.build(&tiger_batch()).await.unwrap();
    let first = snapshot(builder.store()).await;

    let report = builder.build(&tiger_batch()).await.unwrap();
    assert_eq!(report.resolution.map(|r| r.retired()), Some(0));
    assert_eq!(snapshot(builder.store()).await, first);
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let builder = builder(MemoryStore::new());
    builder.store().add_constraint("stale_constraint").await;
    builder.rebuild(&tiger_batch()).await.unwrap();
    let first = snapshot(builder.store()).await;

    builder.rebuild(&tiger_batch()).await.unwrap();
    assert_eq!(snapshot(builder.store()).await, first);
    assert!(builder.store().list_constraints().await.unwrap().is_empty());
    assert_eq!(
        builder.store().list_indexes().await.unwrap(),
        vec!["entity_index"]
    );
}

#[tokio::test]
async fn repeated_records_in_one_batch_share_a_node() {
    let batch = IngestionBatch::from_json_str(
        r#"{"entities": [
            {"type": "Form", "name": "Tiger", "aliases": ["Tora"]},
            {"type": "form", "name": "  Tiger ", "description": "second sighting", "aliases": ["Big Cat"]}
        ]}"#,
    )
    .unwrap();
    let builder = builder(MemoryStore::new());
    let report = builder.build(&batch).await.unwrap();
    assert_eq!(report.nodes, 1);

    let nodes = builder.store().list_nodes(None).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].description.as_deref(), Some("second sighting"));
    assert_eq!(nodes[0].aliases, vec!["Tora", "Big Cat"]);
}

#[tokio::test]
async fn dangling_relation_aborts_before_any_write() {
    let batch = IngestionBatch::from_json_str(
        r#"{
            "entities": [{"type": "Form", "name": "Tiger"}],
            "relations": [{"type": "Connotes", "source": "Tiger", "target": "Power"}]
        }"#,
    )
    .unwrap();
    let builder = builder(MemoryStore::new());
    let err = builder.build(&batch).await.unwrap_err();

    assert!(matches!(err, MythographError::Reference { ref key } if key == "Concept:Power"));
    assert!(builder.store().list_nodes(None).await.unwrap().is_empty());
    assert!(builder.store().list_indexes().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_entity_type_is_rejected() {
    let batch = IngestionBatch::from_json_str(
        r#"{"entities": [{"type": "Person", "name": "Barthes"}]}"#,
    )
    .unwrap();
    let builder = builder(MemoryStore::new());
    let err = builder.build(&batch).await.unwrap_err();

    match err {
        MythographError::Schema { record, .. } => assert!(record.contains("Barthes")),
        other => panic!("expected schema error, got {other:?}"),
    }
    assert!(builder.store().list_nodes(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_dimension_mismatch_fails_before_writing() {
    let builder = GraphBuilder::new(
        MemoryStore::new(),
        CharBucketEmbedder { dim: TEST_DIM + 1 },
        test_config(),
    );
    let err = builder.build(&tiger_batch()).await.unwrap_err();

    assert!(matches!(err, MythographError::Configuration(_)));
    assert!(builder.store().list_nodes(None).await.unwrap().is_empty());
    assert!(builder.store().list_indexes().await.unwrap().is_empty());
}

#[tokio::test]
async fn existing_index_of_other_size_is_a_configuration_error() {
    let store = MemoryStore::new();
    let mut other = test_config().vector_index();
    other.dimensions = TEST_DIM * 2;
    store.create_vector_index(&other).await.unwrap();

    let err = builder(store).build(&tiger_batch()).await.unwrap_err();
    assert!(matches!(err, MythographError::Configuration(_)));
}

#[tokio::test]
async fn existing_index_on_another_label_is_a_configuration_error() {
    let store = MemoryStore::new();
    let mut other = test_config().vector_index();
    other.label = "Form".to_string();
    store.create_vector_index(&other).await.unwrap();

    let builder = builder(store);
    match builder.build(&tiger_batch()).await.unwrap_err() {
        MythographError::Configuration(msg) => assert!(msg.contains("label")),
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert!(builder.store().list_nodes(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_resolution_capability_degrades() {
    let builder = builder(MemoryStore::new().with_resolution_capability(false));
    let report = builder.build(&tiger_batch()).await.unwrap();

    assert!(report.degraded_resolution);
    assert_eq!(report.resolution, Some(ResolutionOutcome::Skipped));
    assert_eq!(report.nodes, 4);
}

#[tokio::test]
async fn resolution_can_be_disabled() {
    let mut config = test_config();
    config.resolve_duplicates = false;
    let builder = GraphBuilder::new(MemoryStore::new(), CharBucketEmbedder::new(), config);
    let report = builder.build(&tiger_batch()).await.unwrap();

    assert_eq!(report.resolution, None);
    assert!(!report.degraded_resolution);
}

#[tokio::test]
async fn near_duplicate_concepts_are_merged() {
    // One substitution across twenty characters scores exactly 0.95.
    let batch = IngestionBatch::from_json_str(
        r#"{
            "entities": [
                {"type": "Form", "name": "Lion"},
                {"type": "Form", "name": "Hare"},
                {"type": "Concept", "name": "Survival of the Weak", "description": "the weak endure"},
                {"type": "Concept", "name": "Survival of the Weac", "aliases": ["Endurance"]}
            ],
            "relations": [
                {"type": "Connotes", "source": "Lion", "target": "Survival of the Weak"},
                {"type": "Connotes", "source": "Hare", "target": "Survival of the Weac"}
            ]
        }"#,
    )
    .unwrap();
    let builder = builder(MemoryStore::new());
    let report = builder.build(&batch).await.unwrap();

    assert_eq!(
        report.resolution,
        Some(ResolutionOutcome::Completed {
            exact: PhaseStats::default(),
            fuzzy: PhaseStats { groups: 1, retired: 1 },
        })
    );

    let store = builder.store();
    let concepts = store.list_nodes(Some(EntityKind::Concept)).await.unwrap();
    assert_eq!(concepts.len(), 1);
    let survivor = &concepts[0];
    assert_eq!(survivor.name, "Survival of the Weak");
    assert_eq!(survivor.description.as_deref(), Some("the weak endure"));
    assert_eq!(survivor.aliases, vec!["Survival of the Weac", "Endurance"]);

    let edges = store.list_edges().await.unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.target == survivor.id));
}

#[tokio::test]
async fn search_finds_entity_by_its_own_text() {
    let builder = builder(MemoryStore::new());
    builder.build(&tiger_batch()).await.unwrap();

    let query = "Name: Fearsome Ruler | Description: Rule sustained by fear";
    let hits = builder.search(query, 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].node.name, "Fearsome Ruler");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn search_with_mismatched_provider_is_a_configuration_error() {
    let builder = GraphBuilder::new(
        MemoryStore::new(),
        CharBucketEmbedder { dim: TEST_DIM + 1 },
        test_config(),
    );
    let err = builder.search("tiger", 3).await.unwrap_err();
    assert!(matches!(err, MythographError::Configuration(_)));
}

#[tokio::test]
async fn later_batches_embed_the_stored_description() {
    let builder = builder(MemoryStore::new());
    let first = r#"{"entities": [{"type": "Form", "name": "Tiger", "description": "A"}]}"#;
    let second = r#"{"entities": [{"type": "Form", "name": "Tiger", "description": "B"}]}"#;
    builder
        .build(&IngestionBatch::from_json_str(first).unwrap())
        .await
        .unwrap();
    builder
        .build(&IngestionBatch::from_json_str(second).unwrap())
        .await
        .unwrap();

    let store = builder.store();
    let nodes = store.list_nodes(None).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].description.as_deref(), Some("A"));
    assert_eq!(
        store.vector(&nodes[0].id, "embedding").await,
        Some(CharBucketEmbedder::new().vector("Name: Tiger | Description: A"))
    );
}

#[tokio::test]
async fn fenced_array_input_is_concatenated() {
    let raw = "Here you go:\n```json\n[\n  {\"entities\": [{\"type\": \"Form\", \"name\": \"Tiger\"}]},\n  {\"entities\": [{\"type\": \"Concept\", \"name\": \"Power\"}],\n   \"relations\": [{\"type\": \"connotes\", \"source\": \"Tiger\", \"target\": \"Power\"}]}\n]\n```";
    let batch = IngestionBatch::from_json_str(raw).unwrap();
    assert_eq!(batch.entities.len(), 2);

    let builder = builder(MemoryStore::new());
    let report = builder.build(&batch).await.unwrap();
    assert_eq!((report.nodes, report.edges), (2, 1));
}
