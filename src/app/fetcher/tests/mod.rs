//! Fetch attempts against a mock CZDS server and a scratch output directory

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{FetchOptions, FetchOutcome, ZoneFetcher};
use crate::app::client::jwt::encode_for_test;
use crate::app::client::{ClientConfig, Credentials, CzdsClient};
use crate::app::queue::DownloadTask;
use crate::errors::DownloadError;

const AUTH_PATH: &str = "/api/authenticate";
const ZONE_PATH: &str = "/czds/downloads/example.zone";
const OLD_DATE: &str = "Tue, 05 Mar 2024 08:00:00 GMT";
const FUTURE_DATE: &str = "Fri, 01 Jan 2100 00:00:00 GMT";

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    let token = encode_for_test(chrono::Utc::now().timestamp() + 3600);
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"accessToken": token, "message": "ok"})),
        )
        .mount(&server)
        .await;
    server
}

fn fetcher(server: &MockServer, options: FetchOptions) -> ZoneFetcher {
    let config = ClientConfig::default()
        .with_endpoints(format!("{}{}", server.uri(), AUTH_PATH), server.uri())
        .with_retry(2, Duration::from_millis(10));
    let client = CzdsClient::new(config, Credentials::new("user", "pass")).unwrap();
    ZoneFetcher::new(Arc::new(client), options)
}

fn options(dir: &TempDir) -> FetchOptions {
    FetchOptions {
        out_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

fn task(server: &MockServer) -> DownloadTask {
    DownloadTask::new(format!("{}{}", server.uri(), ZONE_PATH))
}

async fn mount_head(server: &MockServer, filename: &str, len: usize, last_modified: &str) {
    Mock::given(method("HEAD"))
        .and(path(ZONE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", last_modified)
                .insert_header(
                    "Content-Disposition",
                    format!("attachment; filename=\"{}\"", filename).as_str(),
                )
                .set_body_bytes(vec![0u8; len]),
        )
        .mount(server)
        .await;
}

async fn mount_get(server: &MockServer, body: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(ZONE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(times)
        .mount(server)
        .await;
}

/// Serves a zone whose GET body stops short of the declared Content-Length
///
/// HEAD and GET both declare `declared` bytes; GET sends only `sent` of them
/// and closes the connection. Returns the zone URL and a count of GETs served.
pub(crate) async fn truncating_zone_server(declared: usize, sent: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gets = Arc::new(AtomicUsize::new(0));
    let counter = gets.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = format!(
                    "HTTP/1.1 200 OK\r\n\
                     Content-Length: {}\r\n\
                     Last-Modified: {}\r\n\
                     Content-Disposition: attachment; filename=\"truncated.txt.gz\"\r\n\
                     Connection: close\r\n\r\n",
                    declared, OLD_DATE
                );
                let _ = socket.write_all(head.as_bytes()).await;
                if request.starts_with(b"GET") {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = socket.write_all(&vec![b';'; sent]).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/czds/downloads/truncated.zone", addr), gets)
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
async fn test_downloads_missing_file_atomically() {
    let server = mock_server().await;
    let body = b"example. 86400 IN SOA ns1.example. hostmaster.example. 1 2 3 4 5\n".to_vec();
    mount_head(&server, "example.txt.gz", body.len(), OLD_DATE).await;
    mount_get(&server, &body, 1).await;

    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(&server, options(&dir));
    let mut task = task(&server);

    let outcome = fetcher
        .fetch(&CancellationToken::new(), &mut task)
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::Downloaded { bytes, .. } if bytes == body.len() as u64));
    let dest = dir.path().join("example.txt.gz");
    assert_eq!(task.destination.as_deref(), Some(dest.as_path()));
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    // No temp sibling left behind
    assert_eq!(dir_entries(dir.path()), vec!["example.txt.gz"]);
}

#[tokio::test]
async fn test_existing_file_skipped_by_default() {
    let server = mock_server().await;
    mount_head(&server, "example.txt.gz", 100, FUTURE_DATE).await;
    mount_get(&server, b"unused", 0).await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.txt.gz"), b"old").unwrap();
    let fetcher = fetcher(&server, options(&dir));

    let outcome = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Skipped);
    assert_eq!(std::fs::read(dir.path().join("example.txt.gz")).unwrap(), b"old");
}

#[tokio::test]
async fn test_redownload_skips_current_copy() {
    let server = mock_server().await;
    let body = b"current".to_vec();
    mount_head(&server, "example.txt.gz", body.len(), OLD_DATE).await;
    mount_get(&server, &body, 0).await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.txt.gz"), &body).unwrap();
    let fetcher = fetcher(
        &server,
        FetchOptions {
            redownload: true,
            ..options(&dir)
        },
    );

    let outcome = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Skipped);
}

#[tokio::test]
async fn test_redownload_replaces_different_size() {
    let server = mock_server().await;
    let body = b"a longer replacement body".to_vec();
    mount_head(&server, "example.txt.gz", body.len(), OLD_DATE).await;
    mount_get(&server, &body, 1).await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.txt.gz"), b"short").unwrap();
    let fetcher = fetcher(
        &server,
        FetchOptions {
            redownload: true,
            ..options(&dir)
        },
    );

    let outcome = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
    assert_eq!(std::fs::read(dir.path().join("example.txt.gz")).unwrap(), body);
}

#[tokio::test]
async fn test_redownload_replaces_older_copy() {
    let server = mock_server().await;
    let body = b"same-len".to_vec();
    mount_head(&server, "example.txt.gz", body.len(), FUTURE_DATE).await;
    mount_get(&server, &body, 1).await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.txt.gz"), b"old-copy").unwrap();
    let fetcher = fetcher(
        &server,
        FetchOptions {
            redownload: true,
            ..options(&dir)
        },
    );

    let outcome = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await
        .unwrap();
    assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
    assert_eq!(std::fs::read(dir.path().join("example.txt.gz")).unwrap(), body);
}

#[tokio::test]
async fn test_force_overwrites() {
    let server = mock_server().await;
    let body = b"fresh".to_vec();
    mount_head(&server, "example.txt.gz", body.len(), OLD_DATE).await;
    mount_get(&server, &body, 1).await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.txt.gz"), b"fresh").unwrap();
    let fetcher = fetcher(
        &server,
        FetchOptions {
            force: true,
            ..options(&dir)
        },
    );

    let outcome = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await
        .unwrap();
    assert!(matches!(outcome, FetchOutcome::Downloaded { bytes: 5, .. }));
}

#[tokio::test]
async fn test_unsafe_server_names_rejected() {
    for name in ["..", "../../etc/passwd"] {
        let server = mock_server().await;
        mount_head(&server, name, 10, OLD_DATE).await;
        mount_get(&server, b"0123456789", 0).await;

        let parent = TempDir::new().unwrap();
        let out_dir = parent.path().join("zones");
        std::fs::create_dir(&out_dir).unwrap();
        let fetcher = fetcher(
            &server,
            FetchOptions {
                out_dir: out_dir.clone(),
                ..Default::default()
            },
        );

        let mut task = task(&server);
        let result = fetcher.fetch(&CancellationToken::new(), &mut task).await;

        assert!(
            matches!(result, Err(DownloadError::UnsafePath { .. })),
            "{} should be refused, got {:?}",
            name,
            result
        );
        assert!(task.destination.is_none());
        assert!(dir_entries(&out_dir).is_empty());
        assert_eq!(dir_entries(parent.path()), vec!["zones"]);
    }
}

#[tokio::test]
async fn test_url_name_ignores_disposition() {
    let server = mock_server().await;
    let body = b"zone".to_vec();
    mount_head(&server, "../../etc/passwd", body.len(), OLD_DATE).await;
    mount_get(&server, &body, 1).await;

    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(
        &server,
        FetchOptions {
            use_url_name: true,
            ..options(&dir)
        },
    );

    fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await
        .unwrap();
    assert_eq!(dir_entries(dir.path()), vec!["example.zone"]);
}

#[tokio::test]
async fn test_missing_disposition_fails() {
    let server = mock_server().await;
    Mock::given(method("HEAD"))
        .and(path(ZONE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", OLD_DATE)
                .set_body_bytes(vec![0u8; 4]),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(&server, options(&dir));

    let result = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await;
    assert!(matches!(
        result,
        Err(DownloadError::MissingHeader {
            header: "Content-Disposition",
            ..
        })
    ));
}

#[tokio::test]
async fn test_empty_body_leaves_nothing_behind() {
    let server = mock_server().await;
    mount_head(&server, "example.txt.gz", 10, OLD_DATE).await;
    mount_get(&server, b"", 1).await;

    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(&server, options(&dir));

    let result = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await;

    assert!(matches!(result, Err(DownloadError::EmptyDownload { .. })));
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_failed_transfer_keeps_previous_copy() {
    let server = mock_server().await;
    mount_head(&server, "example.txt.gz", 10, OLD_DATE).await;
    Mock::given(method("GET"))
        .and(path(ZONE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.txt.gz"), b"previous").unwrap();
    let fetcher = fetcher(
        &server,
        FetchOptions {
            force: true,
            ..options(&dir)
        },
    );

    let result = fetcher
        .fetch(&CancellationToken::new(), &mut task(&server))
        .await;

    assert!(matches!(result, Err(DownloadError::Api { status: 500, .. })));
    assert_eq!(dir_entries(dir.path()), vec!["example.txt.gz"]);
    assert_eq!(
        std::fs::read(dir.path().join("example.txt.gz")).unwrap(),
        b"previous"
    );
}

#[tokio::test]
async fn test_truncated_body_fails_and_removes_temp() {
    let server = mock_server().await;
    let (url, gets) = truncating_zone_server(100, 40).await;

    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(&server, options(&dir));

    let result = fetcher
        .fetch(&CancellationToken::new(), &mut DownloadTask::new(url))
        .await;

    // hyper may notice the short body before the length check does
    let err = result.unwrap_err();
    assert!(
        matches!(
            err,
            DownloadError::SizeMismatch {
                expected: 100,
                actual: 40
            } | DownloadError::Http(_)
        ),
        "unexpected error: {:?}",
        err
    );
    assert!(err.is_task_retryable());
    assert_eq!(gets.load(Ordering::SeqCst), 1);
    assert!(dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancelled_before_probe() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let fetcher = fetcher(&server, options(&dir));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = fetcher.fetch(&cancel, &mut task(&server)).await;
    assert!(result.unwrap_err().is_cancelled());
}
