//! Integration tests for a full ingestion batch: fetch over HTTP (wiremock),
//! parse, store, and the run log that records each attempt.
//!
//! Each test creates its own in-memory SQLite database and mock server.

use feedpipe::batch::BatchRunner;
use feedpipe::config::{BatchConfig, FetchConfig};
use feedpipe::feed::Fetcher;
use feedpipe::reader::{ItemQuery, ItemReader};
use feedpipe::storage::{Database, RunStatus};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example RSS</title>
    <item>
      <title>First post</title>
      <link>https://rss.example.com/1</link>
      <guid>rss-1</guid>
      <pubDate>Wed, 13 Dec 2023 18:30:02 GMT</pubDate>
    </item>
    <item>
      <title>Second post</title>
      <link>https://rss.example.com/2</link>
      <guid>rss-2</guid>
    </item>
  </channel>
</rss>"#;

const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <entry>
    <id>urn:uuid:atom-1</id>
    <title>Atom entry</title>
    <link rel="alternate" href="https://atom.example.com/1"/>
    <updated>2023-12-14T08:00:00Z</updated>
    <summary>Summary text</summary>
  </entry>
</feed>"#;

fn fetcher() -> Fetcher {
    Fetcher::new(&FetchConfig {
        timeout_secs: 1,
        allow_private_hosts: true,
        ..FetchConfig::default()
    })
    .unwrap()
}

fn runner(db: &Database) -> BatchRunner {
    BatchRunner::new(
        db.clone(),
        fetcher(),
        BatchConfig {
            fetch_interval_minutes: 60,
            max_concurrency: 4,
        },
    )
}

async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_timeout_in_one_feed_does_not_affect_others() {
    let server = MockServer::start().await;
    serve(&server, "/rss", ResponseTemplate::new(200).set_body_string(RSS_FEED)).await;
    serve(
        &server,
        "/slow",
        ResponseTemplate::new(200)
            .set_body_string(RSS_FEED)
            .set_delay(Duration::from_secs(3)),
    )
    .await;
    serve(&server, "/atom", ResponseTemplate::new(200).set_body_string(ATOM_FEED)).await;

    let db = Database::open(":memory:").await.unwrap();
    let first = db.insert_feed("First", &format!("{}/rss", server.uri())).await.unwrap();
    let slow = db.insert_feed("Slow", &format!("{}/slow", server.uri())).await.unwrap();
    let third = db.insert_feed("Third", &format!("{}/atom", server.uri())).await.unwrap();

    let summary = runner(&db).run_batch().await;

    let statuses: Vec<(i64, RunStatus)> =
        summary.outcomes.iter().map(|o| (o.feed_id, o.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (first, RunStatus::Success),
            (slow, RunStatus::Failed),
            (third, RunStatus::Success),
        ]
    );
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.items_created(), 3);

    let logs = db.get_recent_run_logs(10).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.status.is_terminal() && l.finished_at.is_some()));

    let slow_log = &db.get_run_logs_for_feed(slow, 10).await.unwrap()[0];
    assert_eq!(slow_log.status, RunStatus::Failed);
    assert!(slow_log
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));

    // Only the slow feed keeps its schedule untouched
    let slow_feed = db.get_feed(slow).await.unwrap().unwrap();
    assert!(slow_feed.next_fetch_at.is_none());
    let first_feed = db.get_feed(first).await.unwrap().unwrap();
    assert_eq!(
        first_feed.next_fetch_at,
        first_feed.last_fetched_at.map(|t| t + 3600)
    );
}

#[tokio::test]
async fn test_malformed_and_missing_feeds_recorded_separately() {
    let server = MockServer::start().await;
    serve(&server, "/rss", ResponseTemplate::new(200).set_body_string(RSS_FEED)).await;
    serve(
        &server,
        "/broken",
        ResponseTemplate::new(200).set_body_string("<rss><channel><item>"),
    )
    .await;
    serve(&server, "/missing", ResponseTemplate::new(404)).await;

    let db = Database::open(":memory:").await.unwrap();
    db.insert_feed("Good", &format!("{}/rss", server.uri())).await.unwrap();
    let broken = db.insert_feed("Broken", &format!("{}/broken", server.uri())).await.unwrap();
    let missing = db.insert_feed("Missing", &format!("{}/missing", server.uri())).await.unwrap();

    let summary = runner(&db).run_batch().await;
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 2);

    let broken_log = &db.get_run_logs_for_feed(broken, 1).await.unwrap()[0];
    assert!(broken_log.error_message.as_deref().unwrap().starts_with("parse failed"));
    let missing_log = &db.get_run_logs_for_feed(missing, 1).await.unwrap()[0];
    assert!(missing_log.error_message.as_deref().unwrap().contains("404"));
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_rerunning_batch_creates_no_duplicates() {
    let server = MockServer::start().await;
    serve(&server, "/rss", ResponseTemplate::new(200).set_body_string(RSS_FEED)).await;
    serve(&server, "/atom", ResponseTemplate::new(200).set_body_string(ATOM_FEED)).await;

    let db = Database::open(":memory:").await.unwrap();
    let rss = db.insert_feed("RSS", &format!("{}/rss", server.uri())).await.unwrap();
    db.insert_feed("Atom", &format!("{}/atom", server.uri())).await.unwrap();
    let runner = runner(&db);

    let first = runner.run_batch().await;
    assert_eq!(first.items_created(), 3);

    let second = runner.run_batch().await;
    assert_eq!(second.items_created(), 0);
    assert_eq!(second.succeeded(), 2);
    assert_eq!(db.count_items(None).await.unwrap(), 3);

    // One log row per feed per batch, newest first
    let logs = db.get_run_logs_for_feed(rss, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].items_fetched, 2);
    assert_eq!(logs[0].items_created, 0);
    assert_eq!(logs[1].items_created, 2);
}

// ============================================================================
// Inactive Feeds
// ============================================================================

#[tokio::test]
async fn test_inactive_feed_is_not_fetched_or_logged() {
    let server = MockServer::start().await;
    serve(&server, "/rss", ResponseTemplate::new(200).set_body_string(RSS_FEED)).await;
    Mock::given(method("GET"))
        .and(path("/paused"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ATOM_FEED))
        .expect(0)
        .mount(&server)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    db.insert_feed("Active", &format!("{}/rss", server.uri())).await.unwrap();
    let paused = db.insert_feed("Paused", &format!("{}/paused", server.uri())).await.unwrap();
    assert!(db.set_feed_active(paused, false).await.unwrap());

    let summary = runner(&db).run_batch().await;

    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.skipped_inactive, 1);
    assert!(db.get_run_logs_for_feed(paused, 10).await.unwrap().is_empty());
}

// ============================================================================
// Ingest Then Read
// ============================================================================

#[tokio::test]
async fn test_ingested_items_are_readable_newest_first() {
    let server = MockServer::start().await;
    serve(&server, "/rss", ResponseTemplate::new(200).set_body_string(RSS_FEED)).await;
    serve(&server, "/atom", ResponseTemplate::new(200).set_body_string(ATOM_FEED)).await;

    let db = Database::open(":memory:").await.unwrap();
    db.insert_feed("RSS", &format!("{}/rss", server.uri())).await.unwrap();
    db.insert_feed("Atom", &format!("{}/atom", server.uri())).await.unwrap();
    runner(&db).run_batch().await;
    db.insert_saved_url("https://rss.example.com/1").await.unwrap();

    let page = ItemReader::new(db)
        .get_items(&ItemQuery::default())
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert!(!page.has_more);
    let titles: Vec<&str> = page.items.iter().map(|i| i.title.as_str()).collect();
    // Atom entry is newest, the undated RSS item sorts last
    assert_eq!(titles, vec!["Atom entry", "First post", "Second post"]);
    assert_eq!(page.items[0].feed_name, "Atom");
    assert!(page.items[1].is_saved);
    assert!(!page.items[2].is_saved);
}
