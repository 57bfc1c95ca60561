//! Scanning, idempotence and debounced re-scans.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tint_annotate::{AnnotationScheduler, Document, ScanReport};
use tint_cache::{FileSnapshotSource, SnapshotLoader};
use tint_core::{ColorTable, RankingTable, SchedulerConfig, TintScheme};
use tint_test_utils::{admin_scheme, resolver_with, Element, InMemoryDocument, ScriptedSource};

fn quiet_config() -> SchedulerConfig {
    SchedulerConfig {
        debounce_ms: 500,
        follow_up_scan_ms: None,
    }
}

fn scripted() -> Arc<ScriptedSource> {
    Arc::new(
        ScriptedSource::remote()
            .with_record("alice", &["trust_level_2", "admin"], None)
            .with_record("bob", &["staff"], None)
            .with_record("carol", &["Moderators"], Some("#123456"))
            .with_record("dave", &[], None),
    )
}

fn scheduler(doc: &Arc<InMemoryDocument>, source: &Arc<ScriptedSource>) -> AnnotationScheduler {
    AnnotationScheduler::new(
        doc.clone(),
        resolver_with(source.clone()),
        admin_scheme(),
        quiet_config(),
    )
}

#[tokio::test]
async fn scan_annotates_every_region_kind() {
    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("alice"));
    let avatar = doc.append_silently(doc.root(), Element::avatar("alice"));
    let chat = doc.append_silently(doc.root(), Element::chat_username("carol"));
    let source = scripted();

    let report = scheduler(&doc, &source).scan().await;

    assert_eq!(
        report,
        ScanReport {
            regions: 3,
            annotated: 3,
            ..ScanReport::default()
        }
    );
    assert_eq!(doc.classes(link), vec!["is-trust_level_2", "is-admin"]);
    assert_eq!(doc.style(link, "color").as_deref(), Some("#e74c3c"));

    assert_eq!(doc.style(avatar, "border-color").as_deref(), Some("#e74c3c"));
    assert_eq!(doc.style(avatar, "border-width").as_deref(), Some("2px"));
    assert_eq!(doc.style(avatar, "border-style").as_deref(), Some("solid"));

    let name = doc.children(chat)[0];
    assert!(doc.classes(chat).contains(&"is-moderator".to_string()));
    assert_eq!(doc.style(name, "color").as_deref(), Some("#123456"));
    assert_eq!(doc.style(chat, "color"), None);

    for node in [link, avatar, chat] {
        assert!(doc.is_marked(node));
    }
    // two regions, one entity
    assert_eq!(source.calls_for("alice"), 1);
}

#[tokio::test]
async fn unranked_category_gets_default_color() {
    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("bob"));

    scheduler(&doc, &scripted()).scan().await;

    assert_eq!(doc.classes(link), vec!["is-staff"]);
    assert_eq!(doc.style(link, "color").as_deref(), Some("#000000"));
}

#[tokio::test]
async fn record_without_data_gets_no_styling() {
    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("dave"));

    let report = scheduler(&doc, &scripted()).scan().await;

    assert_eq!(report.annotated, 1);
    assert!(doc.classes(link).is_empty());
    assert_eq!(doc.style(link, "color"), None);
    assert!(doc.is_marked(link));
}

#[tokio::test]
async fn rescan_skips_marked_regions_but_recolors_chat() {
    let doc = Arc::new(InMemoryDocument::new());
    doc.append_silently(doc.root(), Element::user_link("alice"));
    doc.append_silently(doc.root(), Element::avatar("bob"));
    let chat = doc.append_silently(doc.root(), Element::chat_username("alice"));
    let source = scripted();
    let scheduler = scheduler(&doc, &source);

    scheduler.scan().await;
    let report = scheduler.scan().await;

    assert_eq!(
        report,
        ScanReport {
            regions: 3,
            recolored: 1,
            skipped: 2,
            ..ScanReport::default()
        }
    );
    assert_eq!(doc.classes(chat), vec!["chat-message-info__username", "is-trust_level_2", "is-admin"]);
    assert_eq!(source.total_calls(), 2);
    assert_eq!(scheduler.stats().regions_recolored, 1);
}

#[tokio::test]
async fn unresolved_region_is_retried_later() {
    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("bob"));
    let source = scripted();
    source.fail_next("bob", 1);
    let scheduler = scheduler(&doc, &source);

    let first = scheduler.scan().await;
    assert_eq!(first.unresolved, 1);
    assert!(!doc.is_marked(link));

    let second = scheduler.scan().await;
    assert_eq!(second.annotated, 1);
    assert!(doc.is_marked(link));
}

#[tokio::test]
async fn scheme_update_recolors_chat_but_keeps_classes() {
    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("alice"));
    let chat = doc.append_silently(doc.root(), Element::chat_username("alice"));
    let scheduler = scheduler(&doc, &scripted());
    scheduler.scan().await;

    scheduler.update_scheme(TintScheme::new(
        RankingTable::new(["trust_level_2", "admin"]),
        ColorTable::new([("trust_level_2", "#16a085")]),
    ));
    scheduler.scan().await;

    let name = doc.children(chat)[0];
    assert_eq!(doc.style(name, "color").as_deref(), Some("#16a085"));
    assert_eq!(doc.style(link, "color").as_deref(), Some("#e74c3c"));
    assert_eq!(doc.classes(link), vec!["is-trust_level_2", "is-admin"]);
}

#[tokio::test(start_paused = true)]
async fn mutation_burst_triggers_one_rescan() {
    let doc = Arc::new(InMemoryDocument::new());
    let handle = scheduler(&doc, &scripted()).start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let initial = handle.stats();
    assert_eq!(initial.scans_completed, 1);

    for _ in 0..5 {
        doc.append(doc.root(), Element::user_link("alice"));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.stats().scans_started, 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let stats = handle.stats();
    assert_eq!(stats.rescans_scheduled, 5);
    assert_eq!(stats.scans_completed, 2);
    assert_eq!(stats.regions_annotated, 5);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn irrelevant_insertions_do_not_rescan() {
    let doc = Arc::new(InMemoryDocument::new());
    let handle = scheduler(&doc, &scripted()).start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    doc.append(doc.root(), Element::new("div").text("no references here"));
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(handle.stats().rescans_scheduled, 0);
    assert_eq!(handle.stats().scans_completed, 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn navigation_rescans_unobserved_content() {
    let doc = Arc::new(InMemoryDocument::new());
    let handle = scheduler(&doc, &scripted()).start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let link = doc.append_silently(doc.root(), Element::user_link("bob"));
    doc.navigate();
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(doc.is_marked(link));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn follow_up_scan_catches_late_content() {
    let doc = Arc::new(InMemoryDocument::new());
    let config = SchedulerConfig {
        follow_up_scan_ms: Some(300),
        ..quiet_config()
    };
    let handle = AnnotationScheduler::new(
        doc.clone(),
        resolver_with(scripted()),
        admin_scheme(),
        config,
    )
    .start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let link = doc.append_silently(doc.root(), Element::user_link("alice"));
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(doc.is_marked(link));
    assert_eq!(handle.stats().scans_completed, 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn trigger_scan_runs_immediately() {
    let doc = Arc::new(InMemoryDocument::new());
    let handle = scheduler(&doc, &scripted()).start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    doc.append_silently(doc.root(), Element::avatar("alice"));
    let report = handle.trigger_scan().await;

    assert_eq!(report.annotated, 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_observation() {
    let doc = Arc::new(InMemoryDocument::new());
    let handle = scheduler(&doc, &scripted()).start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let scheduler = Arc::clone(handle.scheduler());
    handle.shutdown().await;

    let link = doc.append(doc.root(), Element::user_link("alice"));
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(!doc.is_marked(link));
    assert_eq!(scheduler.stats().scans_completed, 1);
}

#[tokio::test]
async fn snapshot_warms_cache_before_first_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user-cache.json");
    std::fs::write(
        &path,
        r#"{"entities": {"carol": {"categories": ["moderator"], "color": null}}, "generatedAt": 1700000000}"#,
    )
    .unwrap();

    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("Carol"));
    let source = Arc::new(ScriptedSource::remote());
    let resolver = resolver_with(source.clone());
    let loader = SnapshotLoader::new(
        Arc::clone(resolver.cache()),
        Arc::new(FileSnapshotSource::new(&path)),
    );
    let handle = AnnotationScheduler::new(doc.clone(), resolver, admin_scheme(), quiet_config())
        .with_snapshot_loader(loader)
        .start();

    while handle.stats().scans_completed == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(doc.classes(link), vec!["is-moderator"]);
    assert_eq!(doc.style(link, "color").as_deref(), Some("#000000"));
    assert_eq!(source.total_calls(), 0);
    handle.shutdown().await;
}

fn slow_source() -> Arc<ScriptedSource> {
    Arc::new(
        ScriptedSource::remote()
            .with_delay(Duration::from_secs(2))
            .with_record("alice", &["admin"], None)
            .with_record("bob", &["staff"], None),
    )
}

#[tokio::test(start_paused = true)]
async fn insertion_during_slow_initial_scan_schedules_rescan() {
    let doc = Arc::new(InMemoryDocument::new());
    let alice = doc.append_silently(doc.root(), Element::user_link("alice"));
    let source = slow_source();
    let handle = scheduler(&doc, &source).start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let bob = doc.append(doc.root(), Element::user_link("bob"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let stats = handle.stats();
    assert_eq!(stats.scans_completed, 0);
    assert_eq!(stats.rescans_scheduled, 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(doc.is_marked(alice));
    assert!(doc.is_marked(bob));
    assert_eq!(source.calls_for("alice"), 1);
    // the re-scan leaves alice to the initial scan
    assert_eq!(handle.stats().regions_annotated, 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_does_not_wait_for_initial_scan() {
    let doc = Arc::new(InMemoryDocument::new());
    let alice = doc.append_silently(doc.root(), Element::user_link("alice"));
    let handle = scheduler(&doc, &slow_source()).start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let scheduler = Arc::clone(handle.scheduler());

    tokio::time::timeout(Duration::from_millis(50), handle.shutdown())
        .await
        .expect("shutdown blocked on the initial scan");

    // the running scan still completes
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(doc.is_marked(alice));
    assert_eq!(scheduler.stats().scans_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_scans_annotate_region_once() {
    let doc = Arc::new(InMemoryDocument::new());
    let link = doc.append_silently(doc.root(), Element::user_link("alice"));
    let source = slow_source();
    let scheduler = scheduler(&doc, &source);

    let (first, second) = tokio::join!(scheduler.scan(), scheduler.scan());

    assert_eq!(first.annotated + second.annotated, 1);
    assert_eq!(first.skipped + second.skipped, 1);
    assert_eq!(scheduler.stats().regions_annotated, 1);
    assert_eq!(doc.classes(link), vec!["is-admin"]);
    assert_eq!(source.calls_for("alice"), 1);
}
