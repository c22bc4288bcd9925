//! End-to-end crawls through the HTTP fetcher and the configured spider
//!
//! These tests use wiremock to create mock HTTP servers and a temporary
//! directory for the output files.

use feedcrawl::config::{parse_config, Config};
use feedcrawl::spider::ConfiguredSpider;
use feedcrawl::{Engine, HttpFetcher, RunSummary};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a crawl file around the given engine/spider/output sections
fn crawl_file(spider: &str, output_kind: &str, output_path: &Path) -> String {
    format!(
        r#"
[engine]
max-retries = 1
fetch-concurrency = 4
worker-threads = 2

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[http]
timeout-secs = 5
connect-timeout-secs = 2

{}

[output]
kind = "{}"
path = "{}"
"#,
        spider,
        output_kind,
        output_path.display()
    )
}

async fn crawl(config: &Config) -> RunSummary {
    let fetcher = HttpFetcher::from_config(&config.user_agent, &config.http).unwrap();
    let spider = ConfiguredSpider::from_config(config).unwrap();
    let mut engine = Engine::new(spider, Arc::new(fetcher), config.engine_config()).unwrap();
    engine.run().await.unwrap()
}

fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_json_api_crawl_to_jsonl() {
    let mock_server = MockServer::start().await;

    for (room, owner) in [("9500", "alice"), ("142488", "bob")] {
        Mock::given(method("GET"))
            .and(path(format!("/api/RoomApi/room/{}", room)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": 0,
                "data": { "room_id": room, "owner_name": owner, "online": 10 }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("rooms.jsonl");
    let spider = format!(
        r#"
[spider]
name = "douyu"
seeds = ["9500", "142488"]
url-template = "{}/api/RoomApi/room/{{seed}}"
mode = "json"

[spider.fields]
room = "/data/room_id"
owner = "/data/owner_name"
online = "/data/online"
"#,
        mock_server.uri()
    );
    let config = parse_config(&crawl_file(&spider, "jsonl", &output)).unwrap();

    let summary = crawl(&config).await;

    assert_eq!(summary.requests.success, 2);
    assert_eq!(summary.items.success, 2);

    let mut records = read_jsonl(&output);
    records.sort_by_key(|record| record["fields"]["room"].as_str().unwrap().to_string());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["spider"], "douyu");
    assert_eq!(records[0]["fields"]["owner"], "bob");
    assert_eq!(records[1]["fields"]["online"], 10);
    assert!(records[1]["source_url"]
        .as_str()
        .unwrap()
        .ends_with("/api/RoomApi/room/9500"));
}

#[tokio::test]
async fn test_html_follow_crawl_to_sqlite() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><body><h1>Directory</h1>
                    <a class="room" href="/room/1">Room 1</a>
                    <a class="room" href="/room/2">Room 2</a>
                    <a href="/about">About</a>
                    </body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&mock_server)
        .await;

    for id in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path(format!("/room/{}", id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(
                        r#"<html><body><h1>Room {}</h1><img class="cover" src="/cover/{}.png">
                        <a class="room" href="/room/99">Deeper</a></body></html>"#,
                        id, id
                    ))
                    .insert_header("content-type", "text/html"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    // Depth 2 is never requested
    Mock::given(method("GET"))
        .and(path("/room/99"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("rooms.db");
    let spider = format!(
        r#"
[spider]
name = "rooms"
seeds = ["{}/"]
mode = "html"
follow = "a.room"
max-follow-depth = 1

[spider.fields]
title = "h1"
cover = "img.cover@src"
"#,
        base_url
    );
    let config = parse_config(&crawl_file(&spider, "sqlite", &output)).unwrap();

    let summary = crawl(&config).await;

    assert_eq!(summary.requests.total, 3);
    assert_eq!(summary.items.success, 3);

    let conn = Connection::open(&output).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM records WHERE spider = 'rooms'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 3);

    let payload: String = conn
        .query_row(
            "SELECT payload FROM records WHERE source_url LIKE '%/room/2'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    let payload: Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(payload["title"], "Room 2");
    assert_eq!(payload["cover"], "/cover/2.png");
}

#[tokio::test]
async fn test_method_and_headers_from_config() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rooms/7"))
        .and(header("x-room", "7"))
        .and(header("user-agent", "TestBot/1.0.0 (+https://example.com/contact; test@example.com)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 7 })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.jsonl");
    let spider = format!(
        r#"
[spider]
name = "posting"
seeds = ["7"]
url-template = "{}/rooms/{{seed}}"
method = "POST"
mode = "json"

[spider.headers]
X-Room = "{{seed}}"

[spider.fields]
id = "/id"
"#,
        mock_server.uri()
    );
    let config = parse_config(&crawl_file(&spider, "jsonl", &output)).unwrap();

    let summary = crawl(&config).await;

    assert_eq!(summary.items.success, 1);
    assert_eq!(read_jsonl(&output)[0]["fields"]["id"], 7);
}

#[tokio::test]
async fn test_error_status_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.jsonl");
    let spider = format!(
        r#"
[spider]
name = "broken"
seeds = ["{}/broken"]

[spider.fields]
title = "h1"
"#,
        mock_server.uri()
    );
    let config = parse_config(&crawl_file(&spider, "jsonl", &output)).unwrap();

    let summary = crawl(&config).await;

    assert_eq!(summary.requests.total, 1);
    assert_eq!(summary.requests.success, 1);
    assert_eq!(summary.responses.success, 1);
    assert_eq!(summary.items.total, 0);
}

#[tokio::test]
async fn test_accept_status_lets_error_pages_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<h1>Gone</h1>"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.jsonl");
    let spider = format!(
        r#"
[spider]
name = "gone"
seeds = ["{}/gone"]
accept-status = [200, 404]

[spider.fields]
title = "h1"
"#,
        mock_server.uri()
    );
    let config = parse_config(&crawl_file(&spider, "jsonl", &output)).unwrap();

    let summary = crawl(&config).await;

    assert_eq!(summary.items.success, 1);
    assert_eq!(read_jsonl(&output)[0]["fields"]["title"], "Gone");
}

#[tokio::test]
async fn test_unreachable_host_is_retried_then_dropped() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.jsonl");
    let spider = r#"
[spider]
name = "unreachable"
seeds = ["http://127.0.0.1:9/"]

[spider.fields]
title = "h1"
"#;
    let config = parse_config(&crawl_file(spider, "jsonl", &output)).unwrap();

    let summary = crawl(&config).await;

    // max-retries = 1: two attempts plus the dropping dispatch
    assert_eq!(summary.requests.total, 3);
    assert_eq!(summary.requests.fail, 3);
    assert_eq!(summary.responses.total, 0);
}
