//! Duplicate detection against stored documents

mod helpers;

use helpers::{create_test_db, new_document};
use heliograph_common::config::CreateStrategy;
use heliograph_registry::db::documents;
use heliograph_registry::models::NewDocument;
use heliograph_registry::services::{DeduplicationEngine, DuplicateCheck, MatchType};
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use uuid::Uuid;

async fn insert(conn: &mut PoolConnection<Sqlite>, document: &NewDocument) -> Uuid {
    let (record, created) = documents::create(conn, document, CreateStrategy::ConditionalInsert)
        .await
        .unwrap();
    assert!(created);
    record.document_id
}

#[tokio::test]
async fn test_doi_match_takes_precedence_over_hash() {
    let (_dir, pool) = create_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let by_doi = insert(&mut conn, &new_document(Some("10.5/x"), None, "Doi Paper", None)).await;
    let by_hash = insert(&mut conn, &new_document(None, Some("hash-x"), "Hash Paper", None)).await;

    let engine = DeduplicationEngine::default();
    let check = engine
        .check_duplicate(&mut conn, Some("doi:10.5/X"), Some("hash-x"), "Anything", None)
        .await
        .unwrap();
    assert_eq!(check.match_type(), Some(MatchType::Doi));
    assert_eq!(check.existing().map(|d| d.document_id), Some(by_doi));
    assert_eq!(check.score(), Some(1.0));

    let check = engine
        .check_duplicate(&mut conn, Some("10.5/unknown"), Some("hash-x"), "Anything", None)
        .await
        .unwrap();
    assert_eq!(check.match_type(), Some(MatchType::ContentHash));
    assert_eq!(check.existing().map(|d| d.document_id), Some(by_hash));
}

#[tokio::test]
async fn test_empty_identifiers_count_as_absent() {
    let (_dir, pool) = create_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    insert(&mut conn, &new_document(Some("10.5/y"), None, "Present", None)).await;

    let check = DeduplicationEngine::default()
        .check_duplicate(&mut conn, Some("  "), Some(""), "Unrelated Title", None)
        .await
        .unwrap();
    assert!(matches!(check, DuplicateCheck::Unique));
}

#[tokio::test]
async fn test_fuzzy_title_match_within_same_year() {
    let (_dir, pool) = create_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let existing = insert(
        &mut conn,
        &new_document(
            Some("10.5/cme"),
            None,
            "Coronal Mass Ejections in Solar Cycle 24",
            Some(2020),
        ),
    )
    .await;

    let engine = DeduplicationEngine::new(0.9);

    let check = engine
        .check_duplicate(
            &mut conn,
            Some("10.5/preprint"),
            None,
            "Coronal mass ejection in solar cycle 24",
            Some(2020),
        )
        .await
        .unwrap();
    assert_eq!(check.match_type(), Some(MatchType::FuzzyTitle));
    assert_eq!(check.existing().map(|d| d.document_id), Some(existing));
    assert!(check.score().unwrap() >= 0.9);

    // Same title, different year: never a fuzzy match
    let other_year = engine
        .check_duplicate(
            &mut conn,
            Some("10.5/later"),
            None,
            "Coronal Mass Ejections in Solar Cycle 24",
            Some(2021),
        )
        .await
        .unwrap();
    assert!(!other_year.is_duplicate());

    // No year: fuzzy matching is skipped entirely
    let no_year = engine
        .check_duplicate(
            &mut conn,
            Some("10.5/undated"),
            None,
            "Coronal Mass Ejections in Solar Cycle 24",
            None,
        )
        .await
        .unwrap();
    assert!(!no_year.is_duplicate());

    let dissimilar = engine
        .check_duplicate(&mut conn, Some("10.5/other"), None, "Solar Wind Turbulence", Some(2020))
        .await
        .unwrap();
    assert!(!dissimilar.is_duplicate());
}

#[tokio::test]
async fn test_fuzzy_match_on_titles_of_different_length() {
    let (_dir, pool) = create_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let existing = insert(
        &mut conn,
        &new_document(Some("10.5/flux"), None, "Flux Rope Dynamics", Some(2023)),
    )
    .await;

    // Three inserted chars over 18 + 21: 36/39
    let check = DeduplicationEngine::new(0.9)
        .check_duplicate(&mut conn, Some("10.5/flux-2"), None, "Flux Rope Dynamics II", Some(2023))
        .await
        .unwrap();
    assert_eq!(check.match_type(), Some(MatchType::FuzzyTitle));
    assert_eq!(check.existing().map(|d| d.document_id), Some(existing));
    let score = check.score().unwrap();
    assert!((score - 36.0 / 39.0).abs() < 1e-9, "score {}", score);

    let stricter = DeduplicationEngine::new(0.93)
        .check_duplicate(&mut conn, Some("10.5/flux-2"), None, "Flux Rope Dynamics II", Some(2023))
        .await
        .unwrap();
    assert!(!stricter.is_duplicate());

    // 36/46, well below the threshold
    let longer = DeduplicationEngine::new(0.9)
        .check_duplicate(
            &mut conn,
            Some("10.5/flux-3"),
            None,
            "Flux Rope Dynamics Revisited",
            Some(2023),
        )
        .await
        .unwrap();
    assert!(!longer.is_duplicate());
}

#[tokio::test]
async fn test_fuzzy_candidates_scanned_oldest_first_up_to_limit() {
    let (_dir, pool) = create_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    insert(&mut conn, &new_document(Some("10.5/a"), None, "Photospheric Flows", Some(2017))).await;
    let similar = insert(
        &mut conn,
        &new_document(Some("10.5/b"), None, "Chromospheric Heating Mechanisms", Some(2017)),
    )
    .await;

    let title = "Chromospheric Heating Mechanism";

    let limited = DeduplicationEngine::new(0.9).with_candidate_limit(Some(1));
    let check = limited
        .check_duplicate(&mut conn, Some("10.5/c"), None, title, Some(2017))
        .await
        .unwrap();
    assert!(!check.is_duplicate(), "only the oldest candidate should be scanned");

    let default_limit = DeduplicationEngine::new(0.9);
    let check = default_limit
        .check_duplicate(&mut conn, Some("10.5/c"), None, title, Some(2017))
        .await
        .unwrap();
    assert_eq!(check.existing().map(|d| d.document_id), Some(similar));
}

#[tokio::test]
async fn test_composite_key_compares_missing_year() {
    let (_dir, pool) = create_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let id = insert(&mut conn, &new_document(None, Some("hash-c"), "Composite Key", None)).await;

    let found = documents::get_by_composite_key(&mut conn, "hash-c", "composite key", None)
        .await
        .unwrap();
    assert_eq!(found.map(|d| d.document_id), Some(id));

    let wrong_year = documents::get_by_composite_key(&mut conn, "hash-c", "composite key", Some(2020))
        .await
        .unwrap();
    assert!(wrong_year.is_none());
}
