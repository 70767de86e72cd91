//! Worker pool behaviour against a mock CZDS server

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{DownloadStats, EventSink, TaskEvent, WorkerConfig, WorkerPool};
use crate::app::client::jwt::encode_for_test;
use crate::app::client::{ClientConfig, Credentials, CzdsClient};
use crate::app::fetcher::tests::truncating_zone_server;
use crate::app::fetcher::{FetchOptions, ZoneFetcher};
use crate::app::queue::{task_queue, DownloadTask};
use crate::errors::DownloadError;

const LAST_MODIFIED: &str = "Tue, 05 Mar 2024 08:00:00 GMT";

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    let token = encode_for_test(chrono::Utc::now().timestamp() + 3600);
    Mock::given(method("POST"))
        .and(path("/api/authenticate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"accessToken": token, "message": "ok"})),
        )
        .mount(&server)
        .await;
    server
}

fn zone_path(zone: &str) -> String {
    format!("/czds/downloads/{}.zone", zone)
}

/// Mounts HEAD and GET for a healthy zone
async fn mount_zone(server: &MockServer, zone: &str, delay: Duration) {
    let body = format!("{}. 86400 IN SOA ns.{}. admin.{}. 1 2 3 4 5\n", zone, zone, zone);
    Mock::given(method("HEAD"))
        .and(path(zone_path(zone)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", LAST_MODIFIED)
                .insert_header(
                    "Content-Disposition",
                    format!("attachment; filename=\"{}.txt.gz\"", zone).as_str(),
                )
                .set_body_string(body.clone()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(zone_path(zone)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(delay),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Mounts a zone whose probe always fails with `status`
async fn mount_broken_zone(server: &MockServer, zone: &str, status: u16, probes: u64) {
    Mock::given(method("HEAD"))
        .and(path(zone_path(zone)))
        .respond_with(ResponseTemplate::new(status))
        .expect(probes)
        .mount(server)
        .await;
}

struct Harness {
    fetcher: ZoneFetcher,
    out_dir: TempDir,
    server_uri: String,
}

impl Harness {
    fn new(server: &MockServer) -> Self {
        let config = ClientConfig::default()
            .with_endpoints(format!("{}/api/authenticate", server.uri()), server.uri())
            .with_retry(2, Duration::from_millis(10));
        let client = CzdsClient::new(config, Credentials::new("user", "pass")).unwrap();
        let out_dir = TempDir::new().unwrap();
        let fetcher = ZoneFetcher::new(
            Arc::new(client),
            FetchOptions {
                out_dir: out_dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        Self {
            fetcher,
            out_dir,
            server_uri: server.uri(),
        }
    }

    fn tasks(&self, zones: &[&str]) -> Vec<DownloadTask> {
        zones
            .iter()
            .map(|zone| DownloadTask::new(format!("{}{}", self.server_uri, zone_path(zone))))
            .collect()
    }

    async fn run(
        &self,
        config: WorkerConfig,
        zones: &[&str],
        cancel: CancellationToken,
        events: EventSink,
    ) -> (Result<(), DownloadError>, Arc<DownloadStats>) {
        self.run_tasks(config, self.tasks(zones), cancel, events).await
    }

    async fn run_tasks(
        &self,
        config: WorkerConfig,
        tasks: Vec<DownloadTask>,
        cancel: CancellationToken,
        events: EventSink,
    ) -> (Result<(), DownloadError>, Arc<DownloadStats>) {
        let (producer, queue) = task_queue(config.queue_capacity());
        let stats = Arc::new(DownloadStats::new());
        let pool = WorkerPool::new(config, queue, self.fetcher.clone(), stats.clone(), events);

        let (filled, finished) =
            tokio::join!(producer.fill(tasks, &cancel), pool.run(cancel.clone()));
        let result = finished.and(filled.map(|_| ()));
        (result, stats)
    }

    fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.out_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn fast_retries(parallel: usize, retries: u32) -> WorkerConfig {
    WorkerConfig::default()
        .with_parallel(parallel)
        .with_retries(retries, Duration::from_millis(20))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_task_attempted_exactly_retries_times() {
    let server = mock_server().await;
    mount_zone(&server, "com", Duration::ZERO).await;
    mount_zone(&server, "net", Duration::ZERO).await;
    mount_broken_zone(&server, "bad", 500, 3).await;

    let harness = Harness::new(&server);
    let (result, stats) = harness
        .run(
            fast_retries(2, 3),
            &["com", "bad", "net"],
            CancellationToken::new(),
            EventSink::disabled(),
        )
        .await;

    result.unwrap();
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.downloaded, 2);
    assert_eq!(snapshot.failed.len(), 1);
    assert_eq!(snapshot.failed[0].name, "bad.zone");
    assert!(snapshot.failed[0].error.contains("500"));
    assert_eq!(harness.entries(), vec!["com.txt.gz", "net.txt.gz"]);
}

#[tokio::test]
async fn test_truncated_transfer_retried_then_recorded() {
    let server = mock_server().await;
    let (url, gets) = truncating_zone_server(100, 40).await;

    let harness = Harness::new(&server);
    let (result, stats) = harness
        .run_tasks(
            fast_retries(1, 3),
            vec![DownloadTask::new(url.clone())],
            CancellationToken::new(),
            EventSink::disabled(),
        )
        .await;

    result.unwrap();
    assert_eq!(gets.load(Ordering::SeqCst), 3);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.failed.len(), 1);
    assert_eq!(snapshot.failed[0].name, "truncated.zone");
    assert_eq!(snapshot.failed[0].url, url);
    assert!(harness.entries().is_empty());
}

#[tokio::test]
async fn test_rejected_credentials_stop_every_worker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/authenticate"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&server);
    let cancel = CancellationToken::new();
    let (result, stats) = harness
        .run(
            fast_retries(2, 3),
            &["com", "net", "org", "info"],
            cancel.clone(),
            EventSink::disabled(),
        )
        .await;

    assert!(result.unwrap_err().is_systemic());
    assert!(cancel.is_cancelled());
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.downloaded, 0);
    assert!(snapshot.failed.is_empty());
}

#[tokio::test]
async fn test_unsafe_name_not_retried() {
    let server = mock_server().await;
    Mock::given(method("HEAD"))
        .and(path(zone_path("evil")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", LAST_MODIFIED)
                .insert_header("Content-Disposition", "attachment; filename=\"..\"")
                .set_body_string("x"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = Harness::new(&server);
    let (result, stats) = harness
        .run(
            fast_retries(1, 3),
            &["evil"],
            CancellationToken::new(),
            EventSink::disabled(),
        )
        .await;

    result.unwrap();
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.failed.len(), 1);
    assert!(snapshot.failed[0].error.contains("unsafe"));
    assert!(harness.entries().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_never_exceeds_parallel() {
    let server = mock_server().await;
    let zones = ["a", "b", "c", "d", "e", "f"];
    for zone in zones {
        mount_zone(&server, zone, Duration::from_millis(150)).await;
    }

    let harness = Harness::new(&server);
    let (result, stats) = harness
        .run(
            fast_retries(2, 1),
            &zones,
            CancellationToken::new(),
            EventSink::disabled(),
        )
        .await;

    result.unwrap();
    assert_eq!(stats.snapshot().downloaded, 6);
    let peak = stats.peak_in_flight();
    assert!((1..=2).contains(&peak), "peak in flight was {}", peak);
}

#[tokio::test]
async fn test_events_reported() {
    let server = mock_server().await;
    mount_zone(&server, "com", Duration::ZERO).await;
    mount_broken_zone(&server, "bad", 404, 2).await;

    let harness = Harness::new(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (result, _) = harness
        .run(
            fast_retries(1, 2),
            &["com", "bad"],
            CancellationToken::new(),
            EventSink::new(tx),
        )
        .await;
    result.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(events
        .iter()
        .any(|e| matches!(e, TaskEvent::Downloaded { name, .. } if name == "com.zone")));
    assert!(events
        .iter()
        .any(|e| matches!(e, TaskEvent::Retrying { name, attempt: 1, .. } if name == "bad.zone")));
    assert!(events
        .iter()
        .any(|e| matches!(e, TaskEvent::Failed(f) if f.name == "bad.zone")));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 2);
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_delay() {
    let server = mock_server().await;
    mount_broken_zone(&server, "bad", 500, 1).await;

    let harness = Harness::new(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let config = WorkerConfig::default()
        .with_parallel(1)
        .with_retries(3, Duration::from_secs(60));
    let started = std::time::Instant::now();
    let (result, stats) = harness
        .run(config, &["bad"], cancel, EventSink::disabled())
        .await;

    assert!(matches!(result, Err(DownloadError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
    // Cancellation is not a task failure
    assert!(stats.snapshot().failed.is_empty());
}
