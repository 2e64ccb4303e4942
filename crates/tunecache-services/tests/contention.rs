//! Many acquisitions and a collector sharing one SQLite file on a multi-thread
//! runtime. Every run must commit; none may surface a locked database.

mod helpers;

use helpers::{resolved, Harness, Stubs};
use tunecache_services::AcquisitionOutcome;

const TITLES: usize = 16;
const SESSIONS: usize = 4;
const NEW_TITLES: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hits_misses_and_collection_all_commit() {
    let stubs = Stubs::default();
    for i in 0..TITLES + NEW_TITLES {
        stubs.metadata.add(resolved(&format!("id{}", i), &format!("Song {}", i)));
    }
    let h = Harness::new(&stubs).await;

    for i in 0..TITLES {
        h.pipeline.run(&format!("id{}", i), "seed").await.unwrap();
    }

    let mut runs = Vec::new();
    for session in 0..SESSIONS {
        for i in 0..TITLES {
            let pipeline = h.pipeline.clone();
            runs.push(tokio::spawn(async move {
                pipeline
                    .run(&format!("id{}", i), &format!("s{}", session))
                    .await
            }));
        }
    }
    for i in TITLES..TITLES + NEW_TITLES {
        let pipeline = h.pipeline.clone();
        runs.push(tokio::spawn(async move {
            pipeline.run(&format!("id{}", i), "s-new").await
        }));
    }
    let collector = h.collector.clone();
    let collection = tokio::spawn(async move {
        for _ in 0..4 {
            collector.run_cycle().await?;
            tokio::task::yield_now().await;
        }
        anyhow::Ok(())
    });

    let mut extended = 0;
    let mut created = 0;
    for run in runs {
        match run.await.unwrap() {
            Ok(AcquisitionOutcome::Extended { .. }) => extended += 1,
            Ok(AcquisitionOutcome::Created { .. }) => created += 1,
            Ok(other) => panic!("unexpected outcome {:?}", other),
            Err(e) => panic!("acquisition failed under contention: {}", e),
        }
    }
    collection.await.unwrap().unwrap();

    assert_eq!(extended, SESSIONS * TITLES);
    assert_eq!(created, NEW_TITLES);
    assert_eq!(h.media.count().await.unwrap(), (TITLES + NEW_TITLES) as i64);
    assert_eq!(
        h.association_count().await,
        (TITLES + SESSIONS * TITLES + NEW_TITLES) as i64
    );
}
