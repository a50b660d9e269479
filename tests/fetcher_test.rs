//! Integration tests for HttpProgramFetcher using wiremock
//!
//! These tests validate the HTTP fetcher's behavior with mock servers.

use chrono::NaiveDate;
use epgcrawl::crawler::{HttpProgramFetcher, ProgramFetcher};
use epgcrawl::error::FetchError;
use epgcrawl::utils::retry::RetryConfig;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 3, 27).unwrap()
}

fn fetcher(server: &MockServer, max_retries: u32) -> HttpProgramFetcher {
    HttpProgramFetcher::with_config(
        &format!("{}/epg", server.uri()),
        100,
        RetryConfig::with_delays(max_retries, 10, 50),
        Duration::from_millis(500),
        "epgcrawl-test",
    )
    .unwrap()
}

fn guide_body() -> serde_json::Value {
    json!([
        { "air_time": "06:00", "program": "Morning News" },
        { "air_time": "20:00", "program": "Drama" }
    ])
}

/// Test successful fetch from mock server
#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/epg/CCTV-1/2015-03-27"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guide_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = fetcher(&mock_server, 0).fetch("CCTV-1", date()).await;

    assert!(result.is_ok(), "Fetch should succeed: {:?}", result.err());
    let entries = result.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].station_name, "CCTV-1");
    assert_eq!(entries[0].air_date, date());
    assert_eq!(entries[0].air_time, "06:00");
    assert_eq!(entries[1].program, "Drama");
    // 2015-03-27 was a Friday
    assert_eq!(entries[1].week, 5);
}

/// Station names are sent as a single encoded path segment
#[tokio::test]
async fn test_station_name_is_encoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/epg/CCTV%201%2FHD/2015-03-27"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guide_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let entries = fetcher(&mock_server, 0)
        .fetch("CCTV 1/HD", date())
        .await
        .unwrap();
    assert_eq!(entries[0].station_name, "CCTV 1/HD");
}

/// An empty guide is a valid answer
#[tokio::test]
async fn test_empty_guide() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let entries = fetcher(&mock_server, 0).fetch("BTV", date()).await.unwrap();
    assert!(entries.is_empty());
}

/// Test that server errors trigger retries
#[tokio::test]
async fn test_server_error_retry() {
    let mock_server = MockServer::start().await;

    // Return 503 twice, then succeed
    Mock::given(method("GET"))
        .and(path("/epg/CCTV-1/2015-03-27"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/epg/CCTV-1/2015-03-27"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guide_body()))
        .mount(&mock_server)
        .await;

    let result = fetcher(&mock_server, 3).fetch("CCTV-1", date()).await;

    assert!(result.is_ok(), "Should succeed after retries");
}

/// Test 404 does not retry and reports a missing guide
#[tokio::test]
async fn test_404_no_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1) // Should only be called once (no retry)
        .mount(&mock_server)
        .await;

    let err = fetcher(&mock_server, 3)
        .fetch("CCTV-1", date())
        .await
        .unwrap_err();

    match err {
        FetchError::NoGuide { station, date } => {
            assert_eq!(station, "CCTV-1");
            assert_eq!(date, "2015-03-27");
        }
        other => panic!("expected NoGuide, got {other:?}"),
    }
}

/// Test max retries exceeded
#[tokio::test]
async fn test_max_retries_exceeded() {
    let mock_server = MockServer::start().await;

    // Always return 503
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let err = fetcher(&mock_server, 2)
        .fetch("CCTV-1", date())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::MaxRetriesExceeded { attempts: 3 }));
}

/// Malformed bodies are decode errors and are not retried
#[tokio::test]
async fn test_invalid_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = fetcher(&mock_server, 3)
        .fetch("CCTV-1", date())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Decode(_)));
}

/// Slow responses surface as timeouts once retries run out
#[tokio::test]
async fn test_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(guide_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let err = fetcher(&mock_server, 1)
        .fetch("CCTV-1", date())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::MaxRetriesExceeded { attempts: 2 }));
}

/// Test rate limiting
#[tokio::test]
async fn test_rate_limiting() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // 2 requests per second
    let fetcher = HttpProgramFetcher::with_config(
        &mock_server.uri(),
        2,
        RetryConfig::new(0),
        Duration::from_secs(5),
        "epgcrawl-test",
    )
    .unwrap();

    let start = Instant::now();
    for day in 0..4 {
        let date = date() + chrono::Duration::days(day);
        fetcher.fetch("CCTV-1", date).await.unwrap();
    }

    // The quota allows a burst of two; the other two wait half a second each
    assert!(
        start.elapsed() >= Duration::from_millis(900),
        "Rate limiting should slow down requests: {:?}",
        start.elapsed()
    );
}
