//! End-to-end tests for indexing and querying resources

mod common;

use common::{seed_repository, seed_resources, seed_vocabulary, Fixture};
use futures::TryStreamExt;
use lore_search::models::Resource;
use lore_search::search::*;
use lore_search::state::InMemoryStore;
use std::collections::BTreeSet;
use tokio_test::assert_ok;

async fn ids_in(service: &SearchService, request: &SearchRequest) -> BTreeSet<i64> {
    let response = service.search(request).await.unwrap();
    response
        .cursor
        .all()
        .map_ok(|hit| hit.id)
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_chunk_size_does_not_change_results() {
    let mut results = Vec::new();
    for chunk_size in [1, 100] {
        let store = InMemoryStore::new();
        let course = seed_repository(&store, 1, "physics");
        seed_resources(&store, course, 1..=30);
        let fixture = Fixture::new(store).await;

        fixture.store.delete_resource(4).unwrap();
        fixture.store.delete_resource(17).unwrap();

        let report = fixture
            .service
            .indexer()
            .index_resources(1..=30, IndexOptions::chunk_size(chunk_size))
            .await
            .unwrap();
        assert_eq!(report.indexed, 28);
        assert_eq!(report.skipped, 2);

        let request = SearchRequest::default().repository("physics");
        results.push(ids_in(&fixture.service, &request).await);
    }

    assert_eq!(results[0], results[1]);
    assert!(!results[0].contains(&4));
    assert!(!results[0].contains(&17));
    assert_eq!(results[0].len(), 28);
}

#[tokio::test]
async fn test_count_is_one_round_trip() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_resources(&store, course, 1..=5);
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=5).await.unwrap();

    let response = fixture
        .service
        .search(&SearchRequest::default().repository("physics"))
        .await
        .unwrap();
    let index = fixture.service.index_manager();
    let before = index.engine_stats().counts;

    assert_eq!(response.cursor.count().await.unwrap(), 5);
    assert_eq!(response.cursor.count().await.unwrap(), 5);
    assert_eq!(index.engine_stats().counts - before, 1);
}

#[tokio::test]
async fn test_facet_counts_and_missing_sum_to_total() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_vocabulary(&store, 1, 7, "Difficulty", &[(70, "Easy"), (71, "Hard")]);
    seed_resources(&store, course, 1..=12);
    for id in 1..=4 {
        store.tag_resource(id, vec![70]).unwrap();
    }
    for id in 5..=7 {
        store.tag_resource(id, vec![71]).unwrap();
    }
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=12).await.unwrap();

    let response = fixture
        .service
        .search(&SearchRequest::default().repository("physics"))
        .await
        .unwrap();
    let total = response.cursor.count().await.unwrap() as u64;
    assert_eq!(total, 12);

    for summary in response.facets.values() {
        let values: u64 = summary.values.iter().map(|v| v.count).sum();
        assert_eq!(values + summary.facet.missing_count, total, "{}", summary.facet.key);
    }

    let difficulty = &response.facets[&FacetKey::vocabulary(7)];
    assert_eq!(difficulty.facet.missing_count, 5);
    let labels: Vec<&str> = difficulty.values.iter().map(|v| v.label.as_str()).collect();
    assert_eq!(labels, vec!["Easy", "Hard"]);
}

#[tokio::test]
async fn test_blank_titles_sort_last() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    store
        .save_resource(Resource::new(1, course, "problem", "   "))
        .unwrap();
    store
        .save_resource(Resource::new(2, course, "problem", "zeta"))
        .unwrap();
    store
        .save_resource(Resource::new(3, course, "problem", ""))
        .unwrap();
    store
        .save_resource(Resource::new(4, course, "problem", "alpha"))
        .unwrap();
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=4).await.unwrap();

    let response = fixture
        .service
        .search(&SearchRequest::default().repository("physics").sort_by("title"))
        .await
        .unwrap();
    let ids: Vec<i64> = response
        .cursor
        .get_page(1)
        .await
        .unwrap()
        .iter()
        .map(|hit| hit.id)
        .collect();

    // Blank titles tie on the sort key and fall back to id order
    assert_eq!(ids, vec![4, 2, 1, 3]);
}

#[tokio::test]
async fn test_numeric_sort_breaks_ties_by_id() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    for (id, views) in [(1, 5), (2, 9), (3, 5), (4, 1)] {
        store
            .save_resource(Resource::new(id, course, "problem", "t").with_stats(views, 0, 0.0))
            .unwrap();
    }
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=4).await.unwrap();

    let service = &fixture.service;
    let page = |sort: &'static str| {
        async move {
            let response = service
                .search(&SearchRequest::default().repository("physics").sort_by(sort))
                .await
                .unwrap();
            response
                .cursor
                .get_page(1)
                .await
                .unwrap()
                .iter()
                .map(|hit| hit.id)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(page("nr_views").await, vec![2, 1, 3, 4]);
    assert_eq!(page("-nr_views").await, vec![2, 1, 3, 4]);
    assert_eq!(page("bogus").await.len(), 4);
}

#[tokio::test]
async fn test_delete_removes_exactly_one() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_resources(&store, course, 1..=5);
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=5).await.unwrap();

    let service = &fixture.service;
    let count = || async move {
        service
            .search(&SearchRequest::default().repository("physics"))
            .await
            .unwrap()
            .cursor
            .count()
            .await
            .unwrap()
    };

    assert_eq!(count().await, 5);
    assert_ok!(fixture.service.delete_resource(3).await);
    assert_eq!(count().await, 4);
    assert!(fixture
        .service
        .index_manager()
        .get_document(3)
        .await
        .unwrap()
        .is_none());

    assert_ok!(fixture.service.delete_resource(3).await);
    assert_ok!(fixture.service.delete_resource(12345).await);
    assert_eq!(count().await, 4);
}

#[test]
fn test_document_build_is_deterministic() {
    let builder = DocumentBuilder::new("https://lms.example.org");
    let course = CourseMetadata {
        org: "MITx".to_string(),
        course_number: "8.01".to_string(),
        run: "2015_T1".to_string(),
        repository: "physics".to_string(),
    };
    let resource = Resource::new(9, 10, "html", "Caf\u{e9} physics")
        .with_content("<html><p>Mom &amp; pop</p></html>")
        .with_description("Intro");
    let terms = VocabularyTerms::from([(8, vec![81, 80]), (7, vec![])]);

    let first = builder.build(&resource, &course, &terms).to_json().unwrap();
    let second = builder.build(&resource, &course, &terms).to_json().unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[tokio::test]
async fn test_repository_without_vocabularies() {
    let store = InMemoryStore::new();
    let physics = seed_repository(&store, 1, "physics");
    let chemistry = seed_repository(&store, 2, "chemistry");
    seed_vocabulary(&store, 2, 9, "Topic", &[(90, "Acids")]);
    seed_resources(&store, physics, 1..=3);
    seed_resources(&store, chemistry, 4..=6);
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=6).await.unwrap();

    let request = SearchRequest::default().repository("physics");
    assert_eq!(ids_in(&fixture.service, &request).await, BTreeSet::from([1, 2, 3]));

    let response = fixture.service.search(&request).await.unwrap();
    assert!(response
        .facets
        .keys()
        .all(|key| matches!(key, FacetKey::Builtin(_))));
    assert_eq!(response.facets.len(), 3);
}

#[tokio::test]
async fn test_vocabulary_added_after_index_creation() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_resources(&store, course, 1..=3);
    let fixture = Fixture::with_ttl(store, 300).await;
    fixture.service.index_resources(1..=3).await.unwrap();

    seed_vocabulary(&fixture.store, 1, 7, "Difficulty", &[(70, "Hard")]);
    fixture.store.tag_resource(2, vec![70]).unwrap();

    let report = assert_ok!(fixture.service.index_resource(2).await);
    assert_eq!(report.indexed, 1);

    let request = SearchRequest::default()
        .repository("physics")
        .filter("vocab_7_exact:70");
    assert_eq!(ids_in(&fixture.service, &request).await, BTreeSet::from([2]));

    let mapping = fixture.service.index_manager().read_mapping().await.unwrap();
    assert!(mapping.has_field("vocab_7"));
}

#[tokio::test]
async fn test_bulk_index_chunks_and_single_refresh() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_resources(&store, course, 1..=250);
    let fixture = Fixture::new(store).await;
    let index = fixture.service.index_manager();
    let before = index.engine_stats();

    let report = fixture
        .service
        .indexer()
        .index_resources(1..=250, IndexOptions::chunk_size(100))
        .await
        .unwrap();

    let after = index.engine_stats();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.indexed, 250);
    assert_eq!(after.bulk_writes - before.bulk_writes, 3);
    assert_eq!(after.refreshes - before.refreshes, 1);
}

#[tokio::test]
async fn test_unbounded_id_source_is_consumed_lazily() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_resources(&store, course, 1..=10);
    let fixture = Fixture::new(store).await;

    let report = fixture
        .service
        .indexer()
        .index_resources((1..).take_while(|id| *id <= 10), IndexOptions::chunk_size(3))
        .await
        .unwrap();
    assert_eq!(report.chunks, 4);
    assert_eq!(report.indexed, 10);
}

#[tokio::test]
async fn test_text_and_partial_filters() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    store
        .save_resource(
            Resource::new(1, course, "problem", "Ohm's law")
                .with_content("<problem>Voltage equals current times resistance</problem>"),
        )
        .unwrap();
    store
        .save_resource(Resource::new(2, course, "video", "Kirchhoff's rules"))
        .unwrap();
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources([1, 2]).await.unwrap();

    let by_content = SearchRequest::new("resistance").repository("physics");
    assert_eq!(ids_in(&fixture.service, &by_content).await, BTreeSet::from([1]));

    let by_title = SearchRequest::default()
        .repository("physics")
        .filter("title:rules");
    assert_eq!(ids_in(&fixture.service, &by_title).await, BTreeSet::from([2]));

    let by_type = SearchRequest::default()
        .repository("physics")
        .filter("resource_type_exact:video");
    assert_eq!(ids_in(&fixture.service, &by_type).await, BTreeSet::from([2]));

    let malformed = SearchRequest::default().filter("nonsense");
    assert!(matches!(
        fixture.service.search(&malformed).await,
        Err(SearchError::QueryParsingFailed(_))
    ));
}

#[tokio::test]
async fn test_missing_index_is_unavailable() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = SearchConfigBuilder::new()
        .index_path(temp_dir.path().join("absent"))
        .create_if_missing(false)
        .build();

    let result = IndexManager::new(config).await;
    assert!(matches!(result, Err(SearchError::ConnectionUnavailable(_))));
}

#[tokio::test]
async fn test_search_reports_unavailable_without_mapping() {
    let store = InMemoryStore::new();
    seed_repository(&store, 1, "physics");
    let fixture = Fixture::new(store).await;
    std::fs::remove_file(fixture.temp_dir.path().join(MAPPING_FILE)).unwrap();

    let result = fixture
        .service
        .search(&SearchRequest::default().repository("physics"))
        .await;
    match result {
        Err(err) => assert!(matches!(err, SearchError::Unavailable(_)), "{err}"),
        Ok(_) => panic!("search succeeded without a mapping"),
    }
}

#[tokio::test]
async fn test_recreate_index_drops_vocabulary_fields() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_vocabulary(&store, 1, 7, "Difficulty", &[(70, "Hard")]);
    seed_resources(&store, course, 1..=3);
    store.tag_resource(1, vec![70]).unwrap();
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=3).await.unwrap();

    fixture.store.delete_vocabulary(7).unwrap();
    let report = fixture.service.rebuild_index().await.unwrap();
    assert_eq!(report.indexed, 3);

    let mapping = fixture.service.index_manager().read_mapping().await.unwrap();
    assert!(!mapping.has_field("vocab_7"));
    let stats = fixture.service.get_stats().await.unwrap();
    assert_eq!(stats.total_documents, 3);
}

#[tokio::test]
async fn test_reindex_drops_resources_deleted_from_store() {
    let store = InMemoryStore::new();
    let course = seed_repository(&store, 1, "physics");
    seed_resources(&store, course, 1..=3);
    let fixture = Fixture::new(store).await;
    fixture.service.index_resources(1..=3).await.unwrap();

    fixture.store.delete_resource(2).unwrap();
    let report = fixture.service.index_resources(1..=3).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.skipped, 1);

    let request = SearchRequest::default().repository("physics");
    assert_eq!(ids_in(&fixture.service, &request).await, BTreeSet::from([1, 3]));
    assert!(fixture
        .service
        .index_manager()
        .get_document(2)
        .await
        .unwrap()
        .is_none());
}
