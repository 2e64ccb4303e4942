mod helpers;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use sqlx::SqlitePool;

use helpers::{resolved, track, Harness, StubFetcher, StubTranscoder, Stubs, COVER_BYTES};
use tunecache_core::models::{NewMedia, TagSet};
use tunecache_db::{ClientRepository, MediaRepository};
use tunecache_services::providers::{ProviderError, TaggingService};
use tunecache_services::{AcquisitionError, AcquisitionOutcome};

#[tokio::test]
async fn miss_path_creates_tagged_media_and_association() {
    let stubs = Stubs::default();
    let mut item = resolved("vid1", "Artist - Song (Official Video)!!");
    item.track = Some(track("Song", "Artist"));
    stubs.metadata.add(item);
    let h = Harness::new(&stubs).await;

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let outcome = h.pipeline.run_at("vid1", "session-a", t0).await.unwrap();

    let AcquisitionOutcome::Created { media_id, file_name } = outcome else {
        panic!("expected a new media row, got {:?}", outcome);
    };
    assert_eq!(file_name, "Artist - Song (Official Video).mp3");

    let media = h.media.get(media_id).await.unwrap().unwrap();
    assert!(media.downloaded);
    assert_eq!(media.created_at, t0);
    assert_eq!(media.expiration, t0 + TimeDelta::hours(1));
    assert_eq!(media.size_bytes, 3_400_000);
    assert_eq!(media.channel, "Some Channel");

    // Intermediate m4a is gone; only the converted file remains.
    assert_eq!(h.stored_files(), vec![file_name.clone()]);

    let tagged = stubs.tagger.tagged.lock().unwrap().clone();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].0, h.media_dir.join(&file_name));
    assert_eq!(
        tagged[0].1,
        TagSet {
            song: "Song".to_string(),
            artist: "Artist".to_string(),
            album: String::new(),
        }
    );
    assert_eq!(tagged[0].2.as_deref(), Some(COVER_BYTES));

    let listing = h.consumption.list_associations("session-a").await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].media_id, media_id);
    assert_eq!(listing[0].request_time, t0);
    assert_eq!(listing[0].length, "00:03:33");
}

#[tokio::test]
async fn second_session_reuses_media_and_extends_expiration() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    h.pipeline.run_at("vid1", "s1", t0).await.unwrap();
    let before = h.media.find_by_title("Song A").await.unwrap().unwrap();

    let outcome = h
        .pipeline
        .run_at("vid1", "s2", t0 + TimeDelta::minutes(10))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        AcquisitionOutcome::Extended {
            media_id: before.id,
            associated: true
        }
    );

    let after = h.media.find_by_title("Song A").await.unwrap().unwrap();
    assert_eq!(after.expiration, before.expiration + TimeDelta::hours(1));
    assert_eq!(h.media.count().await.unwrap(), 1);
    assert_eq!(h.association_count().await, 2);
    assert_eq!(stubs.fetcher.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeat_request_from_same_session_does_not_duplicate_association() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    h.pipeline.run("vid1", "s1").await.unwrap();
    let before = h.media.find_by_title("Song A").await.unwrap().unwrap();
    let outcome = h.pipeline.run("vid1", "s1").await.unwrap();

    assert_eq!(
        outcome,
        AcquisitionOutcome::Extended {
            media_id: before.id,
            associated: false
        }
    );
    let after = h.media.get(before.id).await.unwrap().unwrap();
    assert_eq!(after.expiration, before.expiration + TimeDelta::hours(1));
    assert_eq!(h.association_count().await, 1);
}

#[tokio::test]
async fn different_identifiers_with_same_title_share_media() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("upload-1", "Song A"));
    stubs.metadata.add(resolved("reupload-2", "Song A"));
    let h = Harness::new(&stubs).await;

    h.pipeline.run("upload-1", "s1").await.unwrap();
    h.pipeline.run("reupload-2", "s2").await.unwrap();

    assert_eq!(h.media.count().await.unwrap(), 1);
    assert_eq!(h.association_count().await, 2);
}

#[tokio::test]
async fn concurrent_requests_for_one_title_download_once() {
    let mut stubs = Stubs::default();
    stubs.fetcher = Arc::new(StubFetcher {
        delay: Some(Duration::from_millis(50)),
        ..StubFetcher::default()
    });
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let (a, b, c) = tokio::join!(
        h.pipeline.run("vid1", "s1"),
        h.pipeline.run("vid1", "s2"),
        h.pipeline.run("vid1", "s3"),
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

    let created = outcomes
        .iter()
        .filter(|o| matches!(o, AcquisitionOutcome::Created { .. }))
        .count();
    assert_eq!(created, 1);
    assert_eq!(stubs.fetcher.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(h.media.count().await.unwrap(), 1);
    assert_eq!(h.association_count().await, 3);
}

#[tokio::test]
async fn missing_audio_stream_ends_silently() {
    let stubs = Stubs::default();
    let mut item = resolved("vid1", "Video Only");
    item.streams.retain(|s| !s.audio_only);
    stubs.metadata.add(item);
    let h = Harness::new(&stubs).await;

    let outcome = h.pipeline.run("vid1", "s1").await.unwrap();

    assert_eq!(
        outcome,
        AcquisitionOutcome::NoCompatibleStream {
            content_id: "vid1".to_string()
        }
    );
    assert_eq!(h.media.count().await.unwrap(), 0);
    let clients = ClientRepository::new(h.pool.clone());
    assert!(clients.get_by_token("s1").await.unwrap().is_none());
    assert_eq!(stubs.fetcher.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unresolvable_identifier_fails_without_side_effects() {
    let stubs = Stubs::default();
    let h = Harness::new(&stubs).await;

    let err = h.pipeline.run("gone", "s1").await.unwrap_err();

    assert!(matches!(err, AcquisitionError::UnresolvableIdentifier { .. }));
    assert!(!err.is_recoverable());
    assert_eq!(h.media.count().await.unwrap(), 0);
    assert_eq!(h.association_count().await, 0);
}

#[tokio::test]
async fn conversion_failure_leaves_no_row_and_no_file() {
    let mut stubs = Stubs::default();
    stubs.transcoder = Arc::new(StubTranscoder { fail: true });
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let err = h.pipeline.run("vid1", "s1").await.unwrap_err();

    assert!(matches!(err, AcquisitionError::ConversionFailure(_)));
    assert!(!err.is_recoverable());
    assert_eq!(h.media.count().await.unwrap(), 0);
    assert_eq!(h.association_count().await, 0);
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn cover_failure_still_tags_without_picture() {
    let mut stubs = Stubs::default();
    stubs.covers = Arc::new(helpers::StubCovers { fail: true });
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let outcome = h.pipeline.run("vid1", "s1").await.unwrap();

    assert!(matches!(outcome, AcquisitionOutcome::Created { .. }));
    let tagged = stubs.tagger.tagged.lock().unwrap().clone();
    assert_eq!(tagged.len(), 1);
    assert!(tagged[0].2.is_none());
}

#[tokio::test]
async fn colliding_file_names_are_disambiguated() {
    let stubs = Stubs::default();
    stubs.metadata.add(resolved("id1", "Song!"));
    stubs.metadata.add(resolved("id2", "Song?"));
    let h = Harness::new(&stubs).await;

    h.pipeline.run("id1", "s1").await.unwrap();
    let outcome = h.pipeline.run("id2", "s1").await.unwrap();

    let AcquisitionOutcome::Created { file_name, .. } = outcome else {
        panic!("expected a second media row, got {:?}", outcome);
    };
    assert_eq!(file_name, "Song [id2].mp3");
    assert_eq!(h.stored_files(), vec!["Song [id2].mp3", "Song.mp3"]);
}

/// Tagger that never finishes within a worker timeout.
struct StalledTagger;

#[async_trait]
impl TaggingService for StalledTagger {
    async fn tag(&self, _path: &Path, _tags: &TagSet, _cover: Option<&[u8]>) -> Result<(), ProviderError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

#[tokio::test]
async fn cancelled_acquisition_leaves_no_files_behind() {
    let mut stubs = Stubs::default();
    stubs.custom_tagger = Some(Arc::new(StalledTagger));
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;

    let run = tokio::time::timeout(Duration::from_millis(200), h.pipeline.run("vid1", "s1")).await;

    assert!(run.is_err(), "tagging should still be in progress");
    assert!(h.stored_files().is_empty());
    assert_eq!(h.media.count().await.unwrap(), 0);
    assert_eq!(h.association_count().await, 0);

    // The title and file locks were released with the dropped run.
    assert_eq!(h.locks.active_keys().await, 0);
}

/// Tagger that commits a row with the same title while the pipeline is still
/// processing, as another process sharing the database would.
#[derive(Default)]
struct RacingTagger {
    pool: OnceLock<SqlitePool>,
}

#[async_trait]
impl TaggingService for RacingTagger {
    async fn tag(&self, _path: &Path, tags: &TagSet, _cover: Option<&[u8]>) -> Result<(), ProviderError> {
        let pool = self.pool.get().expect("pool set before running");
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        MediaRepository::create_in(
            &mut conn,
            &NewMedia {
                title: tags.song.clone(),
                content_id: "other-process".to_string(),
                channel: String::new(),
                thumbnail_url: String::new(),
                duration_seconds: 0,
                size_bytes: 0,
                file_name: format!("{}.mp3", tags.song),
            },
            now,
            now + TimeDelta::hours(1),
        )
        .await
        .unwrap();
        Ok(())
    }
}

#[tokio::test]
async fn losing_a_cross_process_title_race_falls_back_to_reuse() {
    let racing = Arc::new(RacingTagger::default());
    let mut stubs = Stubs::default();
    stubs.custom_tagger = Some(racing.clone());
    stubs.metadata.add(resolved("vid1", "Song A"));
    let h = Harness::new(&stubs).await;
    racing.pool.set(h.pool.clone()).unwrap();

    let outcome = h.pipeline.run("vid1", "s1").await.unwrap();

    let winner = h.media.find_by_title("Song A").await.unwrap().unwrap();
    assert_eq!(winner.content_id, "other-process");
    assert_eq!(
        outcome,
        AcquisitionOutcome::Extended {
            media_id: winner.id,
            associated: true
        }
    );
    assert_eq!(h.media.count().await.unwrap(), 1);
    assert_eq!(h.association_count().await, 1);
    // The file both writers produced is kept for the winning row.
    assert_eq!(h.stored_files(), vec!["Song A.mp3"]);
}
