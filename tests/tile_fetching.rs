use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{StatusCode, Uri};
use axum::Router;
use bytes::Bytes;
use tempdir::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use tilerelay::fetcher::{fetch_tile, spawn_fetcher, FetcherConfig, TileFetchResult};
use tilerelay::relay::{router, RelayState};
use tilerelay::{Arguments, RelayError, TileCoord};

async fn start_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn start_relay() -> String {
    start_server(router(RelayState {
        http_client: reqwest::Client::new(),
        allowed_hosts: vec![],
    }))
    .await
}

/// Upstream stub that answers every request with its own path, records the
/// paths it served, and takes a path-dependent time to answer so that
/// responses to concurrent requests come back out of order.
fn echo_upstream() -> (Router, Arc<Mutex<Vec<String>>>) {
    let paths = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&paths);
    let app = Router::new().fallback(move |uri: Uri| {
        let recorded = Arc::clone(&recorded);
        async move {
            let path = uri.path().to_string();
            recorded.lock().unwrap().push(path.clone());
            let delay = path.bytes().map(u64::from).sum::<u64>() % 5;
            tokio::time::sleep(Duration::from_millis(delay * 10)).await;
            path
        }
    });
    (app, paths)
}

fn tile_config(relay: String, upstream: &str) -> FetcherConfig {
    let mut config = FetcherConfig::new(relay);
    config.tile_template = format!("{}/files/s0/tiles/{{{{X}}}}/{{{{Y}}}}.png", upstream);
    config
}

#[tokio::test]
async fn worker_requests_the_exact_tile_path() {
    let (upstream_app, paths) = echo_upstream();
    let upstream = start_server(upstream_app).await;
    let relay = start_relay().await;
    let config = tile_config(relay, &upstream);

    let (request_sender, requests) = mpsc::channel(1);
    let (result_sender, mut results) = mpsc::channel(1);
    let worker = spawn_fetcher(reqwest::Client::new(), config, requests, result_sender);

    request_sender.send(TileCoord { x: 3, y: 4 }).await.unwrap();
    match results.recv().await.unwrap() {
        TileFetchResult::Success {
            position,
            proxied_url,
            bytes,
        } => {
            assert_eq!(position, TileCoord { x: 3, y: 4 });
            assert!(proxied_url.contains("/api/proxy?url="));
            assert!(proxied_url.contains("%2Ffiles%2Fs0%2Ftiles%2F3%2F4.png"));
            assert_eq!(bytes.unwrap(), Bytes::from("/files/s0/tiles/3/4.png"));
        }
        TileFetchResult::Failure { error, .. } => panic!("expected a success, got: {}", error),
    }
    assert_eq!(paths.lock().unwrap().as_slice(), ["/files/s0/tiles/3/4.png"]);

    // one message per request, and no more: closing the request channel
    // ends the worker without further output
    drop(request_sender);
    assert!(results.recv().await.is_none());
    worker.await.unwrap();
}

#[tokio::test]
async fn transport_failures_become_failure_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let config = FetcherConfig::new(format!("http://{}", dead_addr));
    let result = fetch_tile(
        &reqwest::Client::new(),
        &config,
        TileCoord { x: 7, y: 9 },
    )
    .await;
    match result {
        TileFetchResult::Failure { position, error } => {
            assert_eq!(position, TileCoord { x: 7, y: 9 });
            assert!(!error.is_empty());
        }
        TileFetchResult::Success { .. } => panic!("expected a failure"),
    }
}

#[tokio::test]
async fn upstream_errors_still_count_as_fetched() {
    let upstream_app =
        Router::new().fallback(|| async { (StatusCode::NOT_FOUND, "no such tile") });
    let upstream = start_server(upstream_app).await;
    let relay = start_relay().await;
    let config = tile_config(relay, &upstream);

    match fetch_tile(&reqwest::Client::new(), &config, TileCoord { x: 1, y: 1 }).await {
        TileFetchResult::Success { bytes, .. } => {
            assert_eq!(bytes.unwrap(), Bytes::from("no such tile"));
        }
        TileFetchResult::Failure { error, .. } => panic!("expected a success, got: {}", error),
    }
}

#[tokio::test]
async fn bytes_can_be_left_out_of_result_messages() {
    let (upstream_app, _) = echo_upstream();
    let upstream = start_server(upstream_app).await;
    let relay = start_relay().await;
    let mut config = tile_config(relay, &upstream);
    config.include_bytes = false;

    match fetch_tile(&reqwest::Client::new(), &config, TileCoord { x: 5, y: 6 }).await {
        TileFetchResult::Success { position, bytes, .. } => {
            assert_eq!(position, TileCoord { x: 5, y: 6 });
            assert_eq!(bytes, None);
        }
        TileFetchResult::Failure { error, .. } => panic!("expected a success, got: {}", error),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_workers_correlate_results_by_coordinate() {
    let (upstream_app, _) = echo_upstream();
    let upstream = start_server(upstream_app).await;
    let relay = start_relay().await;
    let config = tile_config(relay, &upstream);
    let client = reqwest::Client::new();

    let (result_sender, mut results) = mpsc::channel(16);
    let mut workers = Vec::new();
    let mut request_senders = Vec::new();
    for x in 0..16u32 {
        let (sender, receiver) = mpsc::channel(1);
        workers.push(spawn_fetcher(
            client.clone(),
            config.clone(),
            receiver,
            result_sender.clone(),
        ));
        sender.send(TileCoord { x, y: 100 - x }).await.unwrap();
        request_senders.push(sender);
    }
    drop(result_sender);
    drop(request_senders);

    let mut seen = HashSet::new();
    while let Some(result) = results.recv().await {
        match result {
            TileFetchResult::Success {
                position, bytes, ..
            } => {
                let expected = format!("/files/s0/tiles/{}/{}.png", position.x, position.y);
                assert_eq!(bytes.unwrap(), Bytes::from(expected));
                assert!(seen.insert(position));
            }
            TileFetchResult::Failure { error, .. } => panic!("tile failed: {}", error),
        }
    }
    assert_eq!(seen.len(), 16);
    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_mode_saves_tiles_to_disk() {
    let (upstream_app, _) = echo_upstream();
    let upstream = start_server(upstream_app).await;
    let relay = start_relay().await;
    let outdir = TempDir::new("tilerelay").unwrap();

    let args = Arguments {
        fetch: vec![TileCoord { x: 1, y: 2 }, TileCoord { x: 3, y: 4 }],
        endpoint: relay,
        tile_template: format!("{}/files/s0/tiles/{{{{X}}}}/{{{{Y}}}}.png", upstream),
        outdir: outdir.path().to_path_buf(),
        parallelism: 2,
        ..Default::default()
    };
    tilerelay::fetch_tiles(&args).await.unwrap();

    let saved = std::fs::read_to_string(outdir.path().join("1_2.png")).unwrap();
    assert_eq!(saved, "/files/s0/tiles/1/2.png");
    assert!(outdir.path().join("3_4.png").exists());
}

#[tokio::test]
async fn fetch_mode_reports_when_nothing_could_be_fetched() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);
    let outdir = TempDir::new("tilerelay").unwrap();

    let args = Arguments {
        fetch: vec![TileCoord { x: 0, y: 0 }],
        endpoint: format!("http://{}", dead_addr),
        outdir: outdir.path().to_path_buf(),
        ..Default::default()
    };
    match tilerelay::fetch_tiles(&args).await {
        Err(RelayError::NoTile) => {}
        other => panic!("expected NoTile, got {:?}", other),
    }
}
