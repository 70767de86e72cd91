//! Command handlers for CZDS Fetcher CLI
//!
//! Each handler merges the configuration file with its flags, resolves
//! credentials, authenticates up front so bad credentials fail fast, and then
//! drives the library. Ctrl-C and SIGTERM cancel whatever is in flight.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::client::requests::{
    request_status, CancelRequestSubmission, Request, RequestsInfo,
};
use crate::app::fetcher::format_bytes;
use crate::app::{
    select_links, Coordinator, CoordinatorConfig, CzdsClient, SessionResult, SignalHandler,
};
use crate::auth::resolve_credentials;
use crate::cli::args::{DownloadArgs, GlobalArgs, RequestArgs, StatusArgs};
use crate::cli::progress::{byte_spinner, ProgressDisplay};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Header of the request listing, matching [`request_row`]
pub const REQUEST_HEADER: &str = "TLD\tID\tUnicodeTLD\tStatus\tCreated\tUpdated\tExpires\tSFTP";

/// Handle the download command
///
/// Fetches the download links, narrows them to the requested zones and runs
/// the coordinator. Any zone that fails permanently makes the command fail
/// after the summary has been printed.
pub async fn handle_download(global: &GlobalArgs, args: DownloadArgs) -> Result<()> {
    let mut config = load_config(global).await?;
    args.apply_to(&mut config);
    config.validate()?;

    let cancel = CancellationToken::new();
    let signals = SignalHandler::setup(cancel.clone());

    let client = connect(global, &config, &cancel).await?;

    info!("Requesting download links");
    let links = client.download_links(&cancel).await?;
    info!("Received {} zone links", links.len());

    let links = select_links(links, &args.requested_zones(), &args.exclude)?;
    if links.is_empty() {
        println!("No zones to download");
        signals.abort();
        return Ok(());
    }

    let coordinator_config = CoordinatorConfig {
        fetch: config.fetch_options(),
        worker: config.worker_config(),
        ..Default::default()
    };
    info!(
        "Downloading {} zones to {} with {} parallel downloads",
        links.len(),
        coordinator_config.fetch.out_dir.display(),
        coordinator_config.worker.parallel
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let progress = ProgressDisplay::new(links.len(), !global.quiet).spawn(event_rx);

    let outcome = Coordinator::new(client, coordinator_config)
        .with_events(event_tx)
        .run(&cancel, links)
        .await;

    // The coordinator and its workers are gone, so the event channel is closed
    if let Err(e) = progress.await {
        debug!("Progress display task ended abnormally: {}", e);
    }
    signals.abort();

    let result = outcome?;
    print_session(&result);

    if result.is_success() {
        Ok(())
    } else {
        Err(AppError::generic(format!(
            "{} of {} zones failed to download",
            result.failed.len(),
            result.total
        )))
    }
}

/// Handle the request command
///
/// Actions run in a fixed order: terms, TLD status, new requests, extensions
/// and cancellations.
pub async fn handle_request(global: &GlobalArgs, args: RequestArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let config = load_config(global).await?;
    config.validate()?;

    let cancel = CancellationToken::new();
    let signals = SignalHandler::setup(cancel.clone());
    let client = connect(global, &config, &cancel).await?;

    let result = run_request(&client, &cancel, &args).await;
    signals.abort();
    result
}

async fn run_request(
    client: &CzdsClient,
    cancel: &CancellationToken,
    args: &RequestArgs,
) -> Result<()> {
    let exclude = clean_list(&args.exclude);
    let reason = args.reason.as_deref().map(str::trim).unwrap_or_default();

    if args.terms {
        let terms = client.terms(cancel).await?;
        info!("Terms version {}", terms.version);
        println!("Terms and Conditions:");
        println!("{}", terms.content);
    }

    if args.status {
        for tld in client.tld_status(cancel).await? {
            println!("{}\t{}", tld.tld, tld.current_status);
        }
    }

    if args.request_all {
        info!("Requesting all TLDs");
        let requested = client.request_all_tlds_except(cancel, reason, &exclude).await?;
        if requested.is_empty() {
            println!("No TLDs available to request");
        } else {
            println!("Requested: {}", requested.join(", "));
        }
    } else {
        let tlds = clean_list(&args.request);
        if !tlds.is_empty() {
            info!("Requesting {}", tlds.join(", "));
            client.request_tlds(cancel, &tlds, reason).await?;
            println!("Requested: {}", tlds.join(", "));
        }
    }

    if args.extend_all {
        info!("Requesting extension for all TLDs");
        let extended = client.extend_all_tlds_except(cancel, &exclude).await?;
        if extended.is_empty() {
            println!("No TLDs to extend");
        } else {
            println!("Extended: {}", extended.join(", "));
        }
    } else {
        let tlds = clean_list(&args.extend);
        for tld in &tlds {
            info!("Requesting extension for {}", tld);
            client.extend_tld(cancel, tld).await?;
        }
        if !tlds.is_empty() {
            println!("Extended: {}", tlds.join(", "));
        }
    }

    let tlds = clean_list(&args.cancel);
    for tld in &tlds {
        info!("Requesting cancellation for {}", tld);
        let request_id = client.zone_request_id(cancel, tld).await?;
        let submission = CancelRequestSubmission {
            request_id,
            tld_name: tld.clone(),
        };
        client.cancel_request(cancel, &submission).await.map_err(|e| {
            AppError::generic(format!("Failed to cancel request for {}: {}", tld, e))
        })?;
    }
    if !tlds.is_empty() {
        println!("Canceled: {}", tlds.join(", "));
    }

    Ok(())
}

/// Handle the status command
///
/// Lists every request, shows one request by `--id` or `--zone`, or saves the
/// CSV report.
pub async fn handle_status(global: &GlobalArgs, args: StatusArgs) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let config = load_config(global).await?;
    config.validate()?;

    let cancel = CancellationToken::new();
    let signals = SignalHandler::setup(cancel.clone());
    let client = connect(global, &config, &cancel).await?;

    let result = run_status(&client, &cancel, &args).await;
    signals.abort();
    result
}

async fn run_status(
    client: &CzdsClient,
    cancel: &CancellationToken,
    args: &StatusArgs,
) -> Result<()> {
    if let Some(report) = &args.report {
        return save_report(client, cancel, report, args.progress).await;
    }

    let request_id = match (&args.id, &args.zone) {
        (_, Some(zone)) => Some(client.zone_request_id(cancel, zone).await.map_err(|e| {
            AppError::generic(format!("Failed to get request ID for zone {}: {}", zone, e))
        })?),
        (Some(id), None) => Some(id.clone()),
        (None, None) => None,
    };

    match request_id {
        Some(id) => {
            let info = client.request_info(cancel, &id).await?;
            print!("{}", format_request_info(&info));
        }
        None => {
            let requests = client.all_requests(cancel, request_status::ALL).await?;
            info!("Total requests: {}", requests.len());
            if !requests.is_empty() {
                println!("{}", REQUEST_HEADER);
                for request in &requests {
                    println!("{}", request_row(request));
                }
            }
        }
    }

    Ok(())
}

async fn save_report(
    client: &CzdsClient,
    cancel: &CancellationToken,
    report: &str,
    show_progress: bool,
) -> Result<()> {
    if report == "-" {
        let mut stdout = tokio::io::stdout();
        client.download_report(cancel, &mut stdout, |_| {}).await?;
        return Ok(());
    }

    let path = Path::new(report);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    info!("Saving report to {}", path.display());

    let mut file = tokio::fs::File::create(path).await?;
    let spinner = byte_spinner(show_progress, "Saving report");
    let written = client
        .download_report(cancel, &mut file, |written| spinner.set_position(written))
        .await;
    spinner.finish_and_clear();

    match written {
        Ok(bytes) => {
            println!("Saved report to {} ({})", path.display(), format_bytes(bytes));
            Ok(())
        }
        Err(e) => {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!("Could not remove incomplete report {}: {}", path.display(), remove_err);
            }
            Err(e.into())
        }
    }
}

/// Loads the configuration file and applies the global overrides
async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load(global.config.as_deref()).await?;
    if global.test_env {
        config.use_test_environment();
    }
    Ok(config)
}

/// Builds an authenticated client
async fn connect(
    global: &GlobalArgs,
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<Arc<CzdsClient>> {
    let credentials = resolve_credentials(
        global.username.as_deref(),
        global.password.as_deref(),
        global.passin.as_deref(),
    )?;

    let client = CzdsClient::new(config.client_config(), credentials)?;
    info!("Authenticating to {}", config.client.auth_url);
    client
        .authenticate(cancel)
        .await
        .map_err(|e| AppError::generic(format!("Authentication failed: {}", e)))?;

    Ok(Arc::new(client))
}

fn print_session(result: &SessionResult) {
    println!("{}", result.summary());
    if !result.failed.is_empty() {
        println!("Failed zones:");
        for failed in &result.failed {
            println!("  {} ({}): {}", failed.name, failed.url, failed.error);
        }
    }
}

/// Trims entries and drops blanks
fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// ANSI C style timestamp, empty when absent
fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_default()
}

/// One tab-separated line of the request listing
pub fn request_row(request: &Request) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        request.tld,
        request.request_id,
        request.ulabel,
        request.status,
        format_time(request.created),
        format_time(request.last_updated),
        format_time(request.expired),
        request.sftp
    )
}

/// Detail view of one request
pub fn format_request_info(info: &RequestsInfo) -> String {
    let tld = match &info.tld {
        Some(tld) => format!("{} ({})", tld.tld, tld.ulabel),
        None => "<unknown>".to_string(),
    };

    let mut out = String::new();
    for (label, value) in [
        ("ID", info.request_id.clone()),
        ("TLD", tld),
        ("Status", info.status.clone()),
        ("Created", format_time(info.created)),
        ("Updated", format_time(info.last_updated)),
        ("Expires", format_time(info.expired)),
        ("AutoRenew", info.auto_renew.to_string()),
        ("Extensible", info.extensible.to_string()),
        ("ExtensionInProcess", info.extension_in_process.to_string()),
        ("Cancellable", info.cancellable.to_string()),
        ("Request IP", info.request_ip.clone()),
        ("FTP IPs", info.ftp_ips.join(", ")),
        ("Reason", info.reason.clone()),
    ] {
        out.push_str(&format!("{}:\t{}\n", label, value));
    }

    out.push_str("History:\n");
    for event in &info.history {
        out.push_str(&format!("\t{}\t{}\n", format_time(event.timestamp), event.action));
    }
    out
}
