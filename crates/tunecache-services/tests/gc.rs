mod helpers;

use chrono::{TimeDelta, TimeZone, Utc};

use helpers::{resolved, Harness, Stubs};
use tunecache_services::GcReport;

#[tokio::test]
async fn stale_associations_and_orphaned_media_are_collected() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("vid1", "Song A"));
    stubs.metadata.add(resolved("vid2", "Song B"));
    let h = Harness::new(&stubs).await;

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    h.pipeline.run_at("vid1", "s1", t0).await.unwrap();
    h.pipeline
        .run_at("vid2", "s2", t0 + TimeDelta::minutes(90))
        .await
        .unwrap();

    let report = h
        .collector
        .run_cycle_at(t0 + TimeDelta::hours(2) + TimeDelta::seconds(1))
        .await
        .unwrap();

    assert_eq!(
        report,
        GcReport {
            associations_deleted: 1,
            media_deleted: 1,
            files_deleted: 1,
            files_missing: 0,
        }
    );
    assert!(h.media.find_by_title("Song A").await.unwrap().is_none());
    assert!(h.media.find_by_title("Song B").await.unwrap().is_some());
    assert_eq!(h.stored_files(), vec!["Song B.mp3"]);
}

#[tokio::test]
async fn orphan_survives_until_expiration_passes() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    h.pipeline.run_at("vid1", "s1", t0).await.unwrap();
    h.consumption.consume("s1", "Song A.mp3").await.unwrap();

    // Expiration equal to now is not yet expired.
    let report = h.collector.run_cycle_at(t0 + TimeDelta::hours(1)).await.unwrap();
    assert_eq!(report, GcReport::default());
    assert_eq!(h.stored_files(), vec!["Song A.mp3"]);

    let report = h
        .collector
        .run_cycle_at(t0 + TimeDelta::hours(1) + TimeDelta::milliseconds(1))
        .await
        .unwrap();
    assert_eq!(report.media_deleted, 1);
    assert_eq!(report.files_deleted, 1);
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn referenced_media_outlives_its_expiration() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    h.pipeline.run_at("vid1", "s1", t0).await.unwrap();

    let report = h
        .collector
        .run_cycle_at(t0 + TimeDelta::minutes(90))
        .await
        .unwrap();

    assert_eq!(report, GcReport::default());
    assert_eq!(h.media.count().await.unwrap(), 1);
}

#[tokio::test]
async fn missing_file_is_counted_and_row_still_removed() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    h.pipeline.run_at("vid1", "s1", t0).await.unwrap();
    std::fs::remove_file(h.media_dir.join("Song A.mp3")).unwrap();

    let report = h
        .collector
        .run_cycle_at(t0 + TimeDelta::hours(3))
        .await
        .unwrap();

    assert_eq!(
        report,
        GcReport {
            associations_deleted: 1,
            media_deleted: 1,
            files_deleted: 0,
            files_missing: 1,
        }
    );
    assert_eq!(h.media.count().await.unwrap(), 0);
}
