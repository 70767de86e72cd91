//! End-to-end download runs against a mock CZDS server
//!
//! Each test drives the public coordinator API the way the CLI does: fetch
//! links, build a coordinator and run it into a scratch directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use czds_fetcher::app::{
    ClientConfig, Coordinator, CoordinatorConfig, Credentials, CzdsClient, FetchOptions,
    TaskEvent, WorkerConfig,
};
use czds_fetcher::errors::{AuthError, DownloadError};

const AUTH_PATH: &str = "/api/authenticate";
const LAST_MODIFIED: &str = "Tue, 05 Mar 2024 08:00:00 GMT";

fn token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"test"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"sub":"tester"}}"#, exp));
    format!("{}.{}.c2lnbmF0dXJl", header, claims)
}

async fn mount_auth(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": token(chrono::Utc::now().timestamp() + 3600),
            "message": "Authentication Successful"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn zone_path(zone: &str) -> String {
    format!("/czds/downloads/{}.zone", zone)
}

fn zone_body(zone: &str) -> Vec<u8> {
    format!("{zone}.\t86400\tIN\tSOA\tns.{zone}. hostmaster.{zone}. 1 7200 900 1209600 86400\n")
        .into_bytes()
}

async fn mount_head(server: &MockServer, zone: &str, filename: &str) {
    Mock::given(method("HEAD"))
        .and(path(zone_path(zone)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", LAST_MODIFIED)
                .insert_header(
                    "Content-Disposition",
                    format!("attachment;filename={}", filename).as_str(),
                )
                .set_body_bytes(zone_body(zone)),
        )
        .mount(server)
        .await;
}

fn get_zone(zone: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(zone_path(zone)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zone_body(zone)))
}

async fn mount_zone(server: &MockServer, zone: &str) {
    mount_head(server, zone, &format!("{}.txt.gz", zone)).await;
    get_zone(zone).mount(server).await;
}

fn client(server: &MockServer) -> Arc<CzdsClient> {
    let config = ClientConfig::default()
        .with_endpoints(format!("{}{}", server.uri(), AUTH_PATH), server.uri())
        .with_retry(2, Duration::from_millis(10));
    Arc::new(CzdsClient::new(config, Credentials::new("tester", "secret")).unwrap())
}

fn links(server: &MockServer, zones: &[&str]) -> Vec<String> {
    zones
        .iter()
        .map(|z| format!("{}{}", server.uri(), zone_path(z)))
        .collect()
}

fn config(dir: &Path, parallel: usize, retries: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        fetch: FetchOptions {
            out_dir: dir.to_path_buf(),
            ..Default::default()
        },
        worker: WorkerConfig::default()
            .with_parallel(parallel)
            .with_retries(retries, Duration::from_millis(50)),
        shuffle: true,
    }
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_one_permanent_failure_among_five() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    for zone in ["com", "net", "org", "info"] {
        mount_zone(&server, zone).await;
    }
    mount_head(&server, "broken", "broken.txt.gz").await;
    Mock::given(method("GET"))
        .and(path(zone_path("broken")))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "Internal Server Error",
            "httpStatus": 500
        })))
        .expect(3)
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let coordinator = Coordinator::new(client(&server), config(out.path(), 3, 3));
    let result = assert_ok!(
        coordinator
            .run(
                &CancellationToken::new(),
                links(&server, &["com", "net", "org", "info", "broken"]),
            )
            .await
    );

    assert_eq!(result.total, 5);
    assert_eq!(result.downloaded, 4);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "broken.zone");
    assert!(result.failed[0].url.ends_with("/czds/downloads/broken.zone"));
    assert!(!result.is_success());
    assert!(result.summary().starts_with("Completed with failures"));

    assert_eq!(
        dir_entries(out.path()),
        vec!["com.txt.gz", "info.txt.gz", "net.txt.gz", "org.txt.gz"]
    );
    assert_eq!(
        std::fs::read(out.path().join("org.txt.gz")).unwrap(),
        zone_body("org")
    );
}

#[tokio::test]
async fn test_second_run_with_freshness_downloads_nothing() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    let zones = ["com", "net", "org"];
    for zone in zones {
        mount_head(&server, zone, &format!("{}.txt.gz", zone)).await;
    }

    let out = TempDir::new().unwrap();
    let client = client(&server);
    let mut run_config = config(out.path(), 2, 2);
    run_config.fetch.redownload = true;

    {
        let mut guards = Vec::new();
        for zone in zones {
            guards.push(get_zone(zone).expect(1).mount_as_scoped(&server).await);
        }
        let first = Coordinator::new(client.clone(), run_config.clone())
            .run(&CancellationToken::new(), links(&server, &zones))
            .await
            .unwrap();
        assert_eq!(first.downloaded, 3);
    }

    for zone in zones {
        get_zone(zone).expect(0).mount(&server).await;
    }
    let second = Coordinator::new(client, run_config)
        .run(&CancellationToken::new(), links(&server, &zones))
        .await
        .unwrap();

    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.bytes_downloaded, 0);
    assert!(second.is_success());
}

#[tokio::test]
async fn test_current_local_copy_is_skipped() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    mount_head(&server, "com", "com.txt.gz").await;
    get_zone("com").expect(0).mount(&server).await;

    let out = TempDir::new().unwrap();
    // Same size, written now, so not older than the remote copy
    std::fs::write(out.path().join("com.txt.gz"), zone_body("com")).unwrap();

    let mut run_config = config(out.path(), 1, 3);
    run_config.fetch.redownload = true;
    let result = Coordinator::new(client(&server), run_config)
        .run(&CancellationToken::new(), links(&server, &["com"]))
        .await
        .unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.bytes_downloaded, 0);
    assert_eq!(dir_entries(out.path()), vec!["com.txt.gz"]);
}

#[tokio::test]
async fn test_traversal_filename_rejected_without_retry() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path(zone_path("evil")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", LAST_MODIFIED)
                .insert_header("Content-Disposition", "attachment; filename=\"../../etc/passwd\"")
                .set_body_bytes(b"root:x:0:0".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    get_zone("evil").expect(0).mount(&server).await;
    mount_zone(&server, "com").await;

    let parent = TempDir::new().unwrap();
    let out = parent.path().join("a").join("b");
    let result = Coordinator::new(client(&server), config(&out, 2, 3))
        .run(&CancellationToken::new(), links(&server, &["evil", "com"]))
        .await
        .unwrap();

    assert_eq!(result.downloaded, 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "evil.zone");
    assert_eq!(dir_entries(&out), vec!["com.txt.gz"]);
    assert_eq!(dir_entries(parent.path()), vec!["a"]);
    assert_eq!(dir_entries(&parent.path().join("a")), vec!["b"]);
}

#[tokio::test]
async fn test_in_flight_downloads_bounded_by_parallel() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    let zones = ["a", "b", "c", "d", "e", "f", "g", "h"];
    for zone in zones {
        mount_head(&server, zone, &format!("{}.txt.gz", zone)).await;
        Mock::given(method("GET"))
            .and(path(zone_path(zone)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(zone_body(zone))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let out = TempDir::new().unwrap();
    let result = Coordinator::new(client(&server), config(out.path(), 3, 1))
        .with_events(tx)
        .run(&CancellationToken::new(), links(&server, &zones))
        .await
        .unwrap();
    assert_eq!(result.downloaded, zones.len());

    let mut in_flight = 0usize;
    let mut peak = 0usize;
    while let Ok(event) = rx.try_recv() {
        match event {
            TaskEvent::Started { .. } => {
                in_flight += 1;
                peak = peak.max(in_flight);
            }
            event if event.is_terminal() => in_flight -= 1,
            _ => {}
        }
    }

    assert_eq!(in_flight, 0);
    assert!(peak <= 3, "peak in-flight {} exceeds parallel", peak);
    assert!(peak >= 2, "downloads never overlapped");
}

#[tokio::test]
async fn test_concurrent_callers_share_one_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "accessToken": token(chrono::Utc::now().timestamp() + 3600),
                    "message": "Authentication Successful"
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/czds/downloads/links"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            format!("{}/czds/downloads/com.zone", server.uri())
        ])))
        .expect(8)
        .mount(&server)
        .await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { client.download_links(&cancel).await })
        })
        .collect();

    for handle in handles {
        let links = assert_ok!(handle.await.unwrap());
        assert_eq!(links.len(), 1);
    }
    assert_eq!(client.session().auth_calls(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_abort_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "message": "Invalid username or password",
            "httpStatus": 401
        })))
        .expect(1)
        .mount(&server)
        .await;
    let zones = ["com", "net", "org"];
    for zone in zones {
        Mock::given(method("HEAD"))
            .and(path(zone_path(zone)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        get_zone(zone).expect(0).mount(&server).await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let out = TempDir::new().unwrap();
    let client = client(&server);
    let cancel = CancellationToken::new();
    let result = Coordinator::new(client.clone(), config(out.path(), 2, 3))
        .with_events(tx)
        .run(&cancel, links(&server, &zones))
        .await;

    assert!(matches!(
        result,
        Err(DownloadError::Auth(AuthError::Rejected { status: 401, .. }))
    ));
    assert_eq!(client.session().auth_calls(), 1);
    // The caller's token is left alone
    assert!(!cancel.is_cancelled());

    let mut retried = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, TaskEvent::Retrying { .. }) {
            retried += 1;
        }
    }
    assert_eq!(retried, 0);
    assert!(dir_entries(out.path()).is_empty());
}
