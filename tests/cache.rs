//! Library Cache Integration Tests
//!
//! Tests for store hits and misses across store instances, eviction,
//! integrity failures, package archives and repeatable resolution.

mod common;

use std::sync::Arc;

use h5pack::domain::LibraryIdentifier;
use h5pack::error::CompileError;
use h5pack::library::store::ENTRY_RECORD;
use h5pack::library::LibraryResolver;
use tempfile::TempDir;

use common::{package_archive, standard_source, store, Lib, MemorySource};

#[tokio::test]
async fn test_fetch_once_then_serve_from_cache() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(standard_source());
    let id = LibraryIdentifier::new("H5P.Column", 1, 18);

    let first = store(&temp, Arc::clone(&source));
    assert!(!first.has(&id).await);
    let bundle = first.get(&id).await.unwrap();
    assert_eq!(bundle.identifier.patch, 3);
    assert!(first.has(&id).await);
    first.get(&id).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    // A fresh store over the same directory reads from disk
    let second = store(&temp, Arc::clone(&source));
    assert!(second.has(&id).await);
    let reloaded = second.get(&id).await.unwrap();
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(reloaded.assets, bundle.assets);
    assert!(!reloaded.has_asset(ENTRY_RECORD));
}

#[tokio::test]
async fn test_list_and_evict() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(standard_source());
    let cache = store(&temp, Arc::clone(&source));

    let text = LibraryIdentifier::new("H5P.AdvancedText", 1, 1);
    let column = LibraryIdentifier::new("H5P.Column", 1, 18);
    cache.get(&text).await.unwrap();
    cache.get(&column).await.unwrap();

    let entries = cache.list().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.sha256.as_ref().is_some_and(|d| d.len() == 64)));
    assert!(entries.iter().any(|e| e.identifier.same_version(&text)));

    assert!(cache.evict(&text).await.unwrap());
    assert!(!cache.evict(&text).await.unwrap());
    assert!(!cache.has(&text).await);
    assert_eq!(cache.list().await.unwrap().len(), 1);

    // Evicted entries are fetched again
    cache.get(&text).await.unwrap();
    assert_eq!(source.fetch_count(), 3);
}

#[tokio::test]
async fn test_integrity_failure_is_not_cached() {
    let temp = TempDir::new().unwrap();
    // Archive under the 1.1 key actually holds 1.2
    let source = Arc::new(
        MemorySource::new().with_raw("H5P.AdvancedText-1.1", Lib::new("H5P.AdvancedText", 1, 2).archive()),
    );
    let cache = store(&temp, Arc::clone(&source));
    let id = LibraryIdentifier::new("H5P.AdvancedText", 1, 1);

    let err = cache.get(&id).await.unwrap_err();
    assert!(matches!(err, CompileError::Integrity { .. }));
    assert!(!cache.has(&id).await);
    assert!(cache.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_error_names_library() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new());
    let cache = store(&temp, source);

    let err = cache
        .get(&LibraryIdentifier::new("H5P.Missing", 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::Fetch { .. }));
    assert!(err.to_string().contains("H5P.Missing"));
}

#[tokio::test]
async fn test_resolution_is_repeatable() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(standard_source());
    let resolver = LibraryResolver::new(store(&temp, Arc::clone(&source)));
    let root = LibraryIdentifier::new("H5P.MultiChoice", 1, 16);

    let first = resolver.resolve(&root).await.unwrap();
    let fetched = source.fetch_count();
    let second = resolver.resolve(&root).await.unwrap();

    assert_eq!(first.identifiers(), second.identifiers());
    assert_eq!(first.len(), 4);
    assert_eq!(source.fetch_count(), fetched);
}

#[tokio::test]
async fn test_dependency_cycle_is_reported() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        MemorySource::new()
            .with(Lib::new("A", 1, 0).dep("B", 1, 0))
            .with(Lib::new("B", 1, 0).dep("C", 1, 0))
            .with(Lib::new("C", 1, 0).dep("A", 1, 0)),
    );
    let resolver = LibraryResolver::new(store(&temp, source));

    let err = resolver
        .resolve(&LibraryIdentifier::new("A", 1, 0))
        .await
        .unwrap_err();
    match err {
        CompileError::Cycle { chain } => {
            assert_eq!(chain, vec!["A-1.0", "B-1.0", "C-1.0", "A-1.0"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_package_archive_supplies_its_dependencies() {
    let temp = TempDir::new().unwrap();
    let multi_choice = Lib::new("H5P.MultiChoice", 1, 16)
        .dep("H5P.Question", 1, 5)
        .dep("H5P.JoubelUI", 1, 3)
        .js("multichoice.js");
    let bytes = package_archive(&[
        Lib::new("H5P.MultiChoice", 1, 16)
            .dep("H5P.Question", 1, 5)
            .dep("H5P.JoubelUI", 1, 3)
            .js("multichoice.js"),
        Lib::new("H5P.Question", 1, 5).dep("H5P.JoubelUI", 1, 3).js("question.js"),
        Lib::new("H5P.JoubelUI", 1, 3).dep("FontAwesome", 4, 5).js("joubel.js"),
        Lib::new("FontAwesome", 4, 5).js("fa.js"),
    ]);
    let source = Arc::new(MemorySource::new().with_raw(&multi_choice.identifier().cache_key(), bytes));
    let resolver = LibraryResolver::new(store(&temp, Arc::clone(&source)));

    let set = resolver.resolve(&multi_choice.identifier()).await.unwrap();

    assert_eq!(set.len(), 4);
    assert_eq!(source.fetches(), vec!["H5P.MultiChoice-1.16"]);
    assert!(set
        .get_by_name("FontAwesome")
        .is_some_and(|b| b.has_asset("fa.js")));

    // Shipped libraries were persisted, not just memoised
    let fresh = store(&temp, Arc::clone(&source));
    assert!(fresh.has(&LibraryIdentifier::new("H5P.Question", 1, 5)).await);
    assert_eq!(fresh.list().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_unsafe_dependency_name_is_rejected() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        MemorySource::new()
            .with(Lib::new("Root", 1, 0).dep("../../escaped", 1, 0))
            .with(Lib::new("../../escaped", 1, 0)),
    );
    let resolver = LibraryResolver::new(store(&temp, Arc::clone(&source)));

    let err = resolver
        .resolve(&LibraryIdentifier::new("Root", 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::Integrity { .. }));
    assert!(err.to_string().contains("../../escaped"));
    assert_eq!(source.fetches(), vec!["Root-1.0"]);
    assert!(resolver.store().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conflicting_version_is_never_fetched() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        MemorySource::new()
            .with(Lib::new("Root", 1, 0).dep("Shared", 1, 0).dep("Other", 1, 0))
            .with(Lib::new("Other", 1, 0).dep("Shared", 1, 1))
            .with(Lib::new("Shared", 1, 0))
            .with(Lib::new("Shared", 1, 1)),
    );
    let resolver = LibraryResolver::new(store(&temp, Arc::clone(&source)));

    let set = resolver
        .resolve(&LibraryIdentifier::new("Root", 1, 0))
        .await
        .unwrap();

    assert!(set.contains(&LibraryIdentifier::new("Shared", 1, 0)));
    assert!(!source.fetches().contains(&"Shared-1.1".to_string()));
    assert_eq!(source.fetch_count(), 3);
}
