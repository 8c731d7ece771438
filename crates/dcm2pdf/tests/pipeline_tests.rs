//! End-to-end batch tests against in-memory collaborators
//!
//! Covers:
//! - Fetch failures isolated to their item
//! - One remote session per fetch
//! - Empty staging directory
//! - Stable artifact paths across reruns

mod common;

use base64::Engine;
use common::{init_tracing, manifest, FakeArchive, FakeConverter, Harness};
use dcm2pdf::BatchItem;
use dcm2pdf_common::Stage;

#[tokio::test]
async fn test_batch_with_one_broken_transfer() {
    init_tracing();
    let archive = FakeArchive::with_manifest(&manifest()).breaking("/archive/a/2.src");
    let h = Harness::new(manifest(), archive, FakeConverter::default());

    let fetched = h.orchestrator.fetch_batch(3).await;
    let fetched_paths: Vec<_> = fetched.artifacts.iter().map(|a| a.path.clone()).collect();
    assert_eq!(
        fetched_paths,
        vec![h.staging().join("ACC1.dcm"), h.staging().join("ACC3.dcm")]
    );

    let summary = h.orchestrator.convert_pending().await;
    assert_eq!(summary.succeeded.len(), 2);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_full_batch_report() {
    init_tracing();
    let archive = FakeArchive::with_manifest(&manifest()).breaking("/archive/a/2.src");
    let h = Harness::new(manifest(), archive, FakeConverter::default());

    let report = h.orchestrator.run_batch(3).await;

    assert_eq!(report.succeeded_count(), 2);
    assert_eq!(report.failed_identifiers(), vec!["ACC2"]);
    assert_eq!(report.failed[0].stage, Stage::Fetch);
    assert!(report.failed[0].message.contains("connection reset"));
    assert_eq!(
        report.succeeded,
        vec![h.output().join("ACC1.pdf"), h.output().join("ACC3.pdf")]
    );
}

#[tokio::test]
async fn test_successful_items_reach_persistence() {
    let archive = FakeArchive::with_manifest(&manifest()).breaking("/archive/a/2.src");
    let h = Harness::new(manifest(), archive, FakeConverter::default());

    h.orchestrator.run_batch(3).await;

    assert_eq!(h.store.filenames(), vec!["ACC1.pdf", "ACC3.pdf"]);

    let rows = h.store.rows.lock().unwrap();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&rows[0].1)
        .unwrap();
    assert_eq!(decoded, b"%PDF-DICM ACC1");
}

#[tokio::test]
async fn test_conversion_failure_is_reported_and_not_persisted() {
    let archive = FakeArchive::with_manifest(&manifest());
    let h = Harness::new(manifest(), archive, FakeConverter::rejecting("ACC3"));

    let report = h.orchestrator.run_batch(3).await;

    assert_eq!(report.succeeded_count(), 2);
    assert_eq!(report.failed_identifiers(), vec!["ACC3"]);
    assert_eq!(report.failed[0].stage, Stage::Convert);
    assert!(report.failed[0].message.contains("cannot parse ACC3"));
    assert_eq!(h.store.filenames(), vec!["ACC1.pdf", "ACC2.pdf"]);
    assert!(!h.output().join("ACC3.pdf").exists());
}

#[tokio::test]
async fn test_failures_across_both_stages_are_counted_once_each() {
    let archive = FakeArchive::with_manifest(&manifest()).breaking("/archive/a/1.src");
    let h = Harness::new(manifest(), archive, FakeConverter::rejecting("ACC3"));

    let report = h.orchestrator.run_batch(3).await;

    assert_eq!(report.processed(), 3);
    assert_eq!(report.failed_identifiers(), vec!["ACC1", "ACC3"]);
    assert_eq!(report.succeeded, vec![h.output().join("ACC2.pdf")]);
}

#[tokio::test]
async fn test_session_scoped_to_one_fetch_call() {
    let archive = FakeArchive::with_manifest(&manifest())
        .breaking("/archive/a/1.src")
        .breaking("/archive/a/3.src");
    let h = Harness::new(manifest(), archive, FakeConverter::default());

    h.orchestrator.fetch_batch(3).await;
    assert_eq!(h.archive_log.opens(), 1);
    assert_eq!(h.archive_log.closes(), 1);

    h.orchestrator.fetch_batch(3).await;
    assert_eq!(h.archive_log.opens(), 2);
    assert_eq!(h.archive_log.closes(), 2);
}

#[tokio::test]
async fn test_unknown_remote_file_is_a_per_item_failure() {
    let mut items = manifest();
    items.insert(1, BatchItem::new("missing/9.src", "ACC9"));
    let archive = FakeArchive::with_manifest(&manifest());
    let h = Harness::new(items, archive, FakeConverter::default());

    let report = h.orchestrator.run_batch(10).await;

    assert_eq!(report.failed_identifiers(), vec!["ACC9"]);
    assert_eq!(report.succeeded_count(), 3);
    assert_eq!(h.archive_log.closes(), 1);
}

#[tokio::test]
async fn test_empty_staging_never_invokes_converter() {
    let h = Harness::new(Vec::new(), FakeArchive::with_manifest(&[]), FakeConverter::default());

    let summary = h.orchestrator.convert_pending().await;

    assert!(summary.succeeded.is_empty());
    assert!(summary.failed.is_empty());
    assert_eq!(h.converter.call_count(), 0);
}

#[tokio::test]
async fn test_empty_manifest_opens_no_session() {
    let h = Harness::new(Vec::new(), FakeArchive::with_manifest(&[]), FakeConverter::default());

    let report = h.orchestrator.run_batch(5).await;

    assert_eq!(report.processed(), 0);
    assert_eq!(h.archive_log.opens(), 0);
}

#[tokio::test]
async fn test_rerun_overwrites_instead_of_duplicating_files() {
    let archive = FakeArchive::with_manifest(&manifest());
    let h = Harness::new(manifest(), archive, FakeConverter::default());

    let first = h.orchestrator.run_batch(3).await;
    let second = h.orchestrator.run_batch(3).await;

    assert_eq!(first.succeeded, second.succeeded);
    assert_eq!(std::fs::read_dir(h.staging()).unwrap().count(), 3);
    assert_eq!(std::fs::read_dir(h.output()).unwrap().count(), 3);
    // the store is not idempotent
    assert_eq!(h.store.filenames().len(), 6);
}

#[tokio::test]
async fn test_limit_caps_the_batch() {
    let archive = FakeArchive::with_manifest(&manifest());
    let h = Harness::new(manifest(), archive, FakeConverter::default());

    let report = h.orchestrator.run_batch(2).await;

    assert_eq!(report.succeeded_count(), 2);
    assert_eq!(h.archive_log.downloads.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_report_follows_manifest_order() {
    let items = vec![BatchItem::new("z/9.src", "ZZZ"), BatchItem::new("a/1.src", "AAA")];
    let archive = FakeArchive::with_manifest(&items);
    let h = Harness::new(items, archive, FakeConverter::default());
    std::fs::write(h.staging().join("OLD1.dcm"), b"DICM OLD1").unwrap();

    let report = h.orchestrator.run_batch(2).await;

    assert_eq!(
        report.succeeded,
        vec![
            h.output().join("ZZZ.pdf"),
            h.output().join("AAA.pdf"),
            h.output().join("OLD1.pdf"),
        ]
    );
}

#[tokio::test]
async fn test_missing_remote_file_keeps_previously_staged_copy() {
    let items = vec![BatchItem::new("gone/2.src", "ACC2")];
    let h = Harness::new(items, FakeArchive::with_manifest(&[]), FakeConverter::default());
    std::fs::write(h.staging().join("ACC2.dcm"), b"DICM ACC2").unwrap();

    let report = h.orchestrator.run_batch(1).await;

    assert_eq!(report.failed_identifiers(), vec!["ACC2"]);
    assert_eq!(std::fs::read(h.staging().join("ACC2.dcm")).unwrap(), b"DICM ACC2");
}
