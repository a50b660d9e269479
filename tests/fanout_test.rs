//! Integration tests for the fan-out aggregator

mod common;

use common::{coordinator, today, MockFetcher};
use epgcrawl::crawler::FanoutAggregator;
use epgcrawl::Station;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn stations(names: &[&str]) -> Vec<Station> {
    names.iter().map(|n| Station::new(*n)).collect()
}

/// A failing station is skipped; the others still contribute
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_station_is_skipped() {
    let fetcher = Arc::new(MockFetcher::new().failing("B"));
    let (sf, _store) = coordinator(fetcher.clone());
    let fanout = FanoutAggregator::new(sf, 2, Duration::ZERO);

    let report = fanout.crawl_all(&stations(&["A", "B", "C"]), today()).await;

    let contributed: HashSet<_> = report
        .entries
        .iter()
        .map(|e| e.station_name.as_str())
        .collect();
    assert_eq!(contributed, HashSet::from(["A", "C"]));
    assert_eq!(report.entries.len(), 4);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].station, "B");
    assert_eq!(report.requested(), 3);
    assert_eq!(fetcher.calls(), 3);
}

/// Never more fetches at once than the pool allows
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency() {
    let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(40)));
    let (sf, _store) = coordinator(fetcher.clone());
    let fanout = FanoutAggregator::new(sf, 2, Duration::ZERO);

    let names: Vec<String> = (0..8).map(|i| format!("ST-{i}")).collect();
    let list: Vec<Station> = names.iter().map(Station::new).collect();

    let report = fanout.crawl_all(&list, today()).await;

    assert!(report.all_succeeded());
    assert_eq!(report.succeeded.len(), 8);
    assert_eq!(report.entries.len(), 16);
    assert_eq!(fetcher.calls(), 8);
    assert!(fetcher.peak_concurrency() <= 2);
    assert_eq!(fetcher.peak_concurrency(), 2);
}

/// Parallel fan-out calls share one pool
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fanouts_share_pool() {
    let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(40)));
    let (sf, _store) = coordinator(fetcher.clone());
    let fanout = Arc::new(FanoutAggregator::new(sf, 2, Duration::ZERO));

    let first = {
        let fanout = Arc::clone(&fanout);
        tokio::spawn(async move { fanout.crawl_all(&stations(&["A", "B", "C"]), today()).await })
    };
    let second = {
        let fanout = Arc::clone(&fanout);
        let tomorrow = today().succ_opt().unwrap();
        tokio::spawn(async move { fanout.crawl_all(&stations(&["A", "B", "C"]), tomorrow).await })
    };

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert!(first.all_succeeded() && second.all_succeeded());
    assert_eq!(fetcher.calls(), 6);
    assert!(fetcher.peak_concurrency() <= 2);
}

/// Submissions are spaced by the configured interval
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submissions_are_paced() {
    let fetcher = Arc::new(MockFetcher::new());
    let (sf, _store) = coordinator(fetcher.clone());
    let fanout = FanoutAggregator::new(sf, 4, Duration::from_millis(100));

    let report = fanout
        .crawl_all(&stations(&["A", "B", "C", "D"]), today())
        .await;
    assert!(report.all_succeeded());

    let mut started: Vec<_> = fetcher.started().into_iter().map(|(_, at)| at).collect();
    started.sort();
    let span = started[3].duration_since(started[0]);
    // Four submissions need three full intervals between the first and last
    assert!(span >= Duration::from_millis(250), "span was {span:?}");
}

/// Stations already crawled are served from the store on the next fan-out
#[tokio::test]
async fn test_second_fanout_hits_store() {
    let fetcher = Arc::new(MockFetcher::new());
    let (sf, store) = coordinator(fetcher.clone());
    let fanout = FanoutAggregator::new(sf, 2, Duration::ZERO);
    let list = stations(&["A", "B"]);

    let first = fanout.crawl_all(&list, today()).await;
    let second = fanout.crawl_all(&list, today()).await;

    assert_eq!(first.entries.len(), second.entries.len());
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(store.len(), 2);
}

/// Dates outside the window yield an empty, fully successful report
#[tokio::test]
async fn test_out_of_window_date() {
    let fetcher = Arc::new(MockFetcher::new());
    let (sf, _store) = coordinator(fetcher.clone());
    let fanout = FanoutAggregator::new(sf, 2, Duration::ZERO);

    let report = fanout
        .crawl_all(&stations(&["A", "B"]), today() + chrono::Duration::days(10))
        .await;

    assert!(report.entries.is_empty());
    assert!(report.all_succeeded());
    assert_eq!(fetcher.calls(), 0);
}

/// Shutdown mid-crawl stops submitting; the rest are reported as failed
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_stops_paced_submission() {
    let fetcher = Arc::new(MockFetcher::new());
    let (sf, _store) = coordinator(fetcher.clone());
    let fanout = FanoutAggregator::new(Arc::clone(&sf), 2, Duration::from_millis(50));

    let names: Vec<String> = (0..10).map(|i| format!("ST-{i}")).collect();
    let list: Vec<Station> = names.iter().map(Station::new).collect();

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        sf.shutdown();
    });

    let report = tokio::time::timeout(Duration::from_secs(2), fanout.crawl_all(&list, today()))
        .await
        .expect("crawl_all should return after shutdown");
    trigger.await.unwrap();

    assert!(fetcher.calls() < 10, "submitted {} stations", fetcher.calls());
    assert_eq!(report.requested(), 10);
    assert_eq!(report.succeeded.len(), fetcher.calls());
    assert!(report
        .failed
        .iter()
        .all(|f| f.error == "crawl cancelled before submission"));
}
