use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rollcall_app_core::{
    AttendanceRecorder, CycleExit, PairingFlow, RecordOutcome, SettingsRepo, SettingsSnapshot,
    StatusStore, StoreAdapter, SyncOrchestrator, SyncService,
};
use rollcall_core::token::issue_legacy_token;
use rollcall_core::{
    Direction, DuplicateScanDetector, PairingTokenValidator, ScanLogRecord, SERVICE_UUID,
};
use rollcall_infra::{Beacon, BeaconAdvertiser, TcpLinkConnector, TcpLinkListener, UdpDiscovery};
use rollcall_persistence::{LogQuery, LogStore};
use rollcall_pipeline::serve_links;
use rollcall_scanner::DiscoveryScanner;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{CliSortOrder, Workspace};

const STATUS_POLL: Duration = Duration::from_millis(500);

/// Runs the background receiver until it halts or Ctrl-C.
pub async fn cmd_receive(ws: &Workspace, on_boot: bool) -> Result<()> {
    let settings = ws.files.load_or_init()?;
    if on_boot && !settings.auto_start {
        println!(":: Auto-start is off; not receiving.");
        return Ok(());
    }

    let store = ws.store()?;
    let discovery = Arc::new(UdpDiscovery::on_port(settings.beacon_port));
    let (tx, rx) = mpsc::channel(64);
    let status = StatusStore::new();
    let pump = {
        let status = status.clone();
        tokio::spawn(async move { status.pump(rx).await })
    };

    let orchestrator = SyncOrchestrator::new(
        DiscoveryScanner::new(discovery),
        Arc::new(TcpLinkConnector),
        Arc::new(StoreAdapter::new(store)),
        tx,
    );
    let mut service = SyncService::new(orchestrator);
    service.start().await?;
    println!(
        ":: Listening for scanners on UDP {} (Ctrl-C to stop)",
        settings.beacon_port
    );

    let mut ticker = tokio::time::interval(STATUS_POLL);
    let mut shown = String::new();
    let exit = loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl-C")?;
                break service.stop().await?;
            }
            _ = ticker.tick() => {
                let line = status.status().describe();
                if line != shown {
                    println!("   {line}");
                    shown = line;
                }
                if !service.is_running() {
                    break service.wait().await?;
                }
            }
        }
    };

    // Dropping the orchestrator closes the event channel.
    drop(service);
    let _ = pump.await;

    let last = status.status();
    println!("\n:: {}", last.describe());
    println!("   Transfers completed: {}", last.transfers_completed);
    println!("   Logs received:       {}", last.records_received);
    if let CycleExit::Halted(reason) = exit {
        info!("Receiver halted: {:?}", reason);
        println!("   Run `rollcall receive` again to restart.");
    }
    Ok(())
}

/// Advertises this device and serves its unsent logs until Ctrl-C.
pub async fn cmd_host(ws: &Workspace, name: Option<String>) -> Result<()> {
    let settings = ws.files.load_or_init()?;
    let store = ws.store()?;
    let pending = store.unsent_logs()?.len();

    let mut listener = TcpLinkListener::bind(SocketAddr::from(([0, 0, 0, 0], settings.link_port)))
        .await
        .with_context(|| format!("Failed to listen on TCP {}", settings.link_port))?;
    let link = listener.local_addr()?;

    let beacon = Beacon {
        service_ids: vec![SERVICE_UUID],
        name: Some(name.unwrap_or_else(|| settings.device_id.clone())),
        link,
    };
    let target = SocketAddr::from(([255, 255, 255, 255], settings.beacon_port));
    let advertiser = BeaconAdvertiser::bind(SocketAddr::from(([0, 0, 0, 0], 0)), target, &beacon)
        .await
        .context("Failed to open beacon socket")?;

    let cancel = CancellationToken::new();
    let advertising = tokio::spawn(advertiser.run(cancel.clone()));
    let outbox = Arc::new(StoreAdapter::new(store.clone()));
    let serving = {
        let cancel = cancel.clone();
        tokio::spawn(async move { serve_links(&mut listener, outbox, cancel).await })
    };

    println!(":: Hosting {} unsent logs on {} (Ctrl-C to stop)", pending, link);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    cancel.cancel();

    serving.await.context("Link server task failed")??;
    advertising.await.context("Beacon task failed")??;
    println!(":: Stopped. {} logs still unsent.", store.unsent_logs()?.len());
    Ok(())
}

pub fn cmd_record(ws: &Workspace, student_id: &str, direction: Direction) -> Result<()> {
    let store = ws.store()?;
    let detector = DuplicateScanDetector::new(
        Arc::new(StoreAdapter::new(store.clone())),
        Arc::new(SettingsSnapshot(Arc::new(ws.files.clone()))),
    );
    let recorder = AttendanceRecorder::new(store, detector);

    match recorder.record(student_id, direction, Utc::now())? {
        RecordOutcome::Recorded(rec) => println!(
            "Recorded {} for {} at {}",
            direction,
            rec.student_name,
            rec.timestamp.format("%Y-%m-%d %H:%M")
        ),
        RecordOutcome::Duplicate => println!(
            "Already recorded {} for {} in this window; ignored.",
            direction, student_id
        ),
    }
    Ok(())
}

pub fn cmd_token_issue(ws: &Workspace) -> Result<()> {
    let settings = ws.files.load_or_init()?;
    println!("{}", issue_legacy_token(&settings.device_id, Utc::now()));
    Ok(())
}

pub fn cmd_token_check(raw: &str) -> Result<()> {
    let token = PairingTokenValidator::default()
        .check_raw(raw.trim(), Utc::now())
        .context("Token rejected")?;
    println!("Token is valid: {:?}", token);
    Ok(())
}

/// Validates a scanned pairing code and optionally starts receiving.
pub async fn cmd_pair(ws: &Workspace, raw: &str, start: bool) -> Result<()> {
    let paired = PairingFlow::default().accept(raw, Utc::now())?;
    match &paired.device_id {
        Some(device) => println!(":: Paired with {}", device),
        None => println!(":: Paired using a session code"),
    }
    if start {
        cmd_receive(ws, false).await?;
    }
    Ok(())
}

pub fn cmd_settings_show(ws: &Workspace) -> Result<()> {
    let settings = ws.files.load_or_init()?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    for direction in [Direction::Entry, Direction::Exit] {
        match settings.school.window_for(direction) {
            Some(w) => println!("{direction} window: {w}"),
            None => println!("{direction} window: not set (no duplicate check)"),
        }
    }
    Ok(())
}

pub fn cmd_settings_set_window(
    ws: &Workspace,
    direction: Direction,
    start: &str,
    end: &str,
) -> Result<()> {
    let mut settings = ws.files.load_or_init()?;
    let window = settings.school.set_window(direction, start, end)?;
    ws.files.save(&settings)?;
    println!("{direction} window set to {window}");
    Ok(())
}

pub fn cmd_settings_utc_offset(ws: &Workspace, minutes: i32) -> Result<()> {
    if !(-14 * 60..=14 * 60).contains(&minutes) {
        bail!("UTC offset must be within +/-14 hours");
    }
    let mut settings = ws.files.load_or_init()?;
    settings.school.utc_offset_minutes = minutes;
    ws.files.save(&settings)?;
    println!("School clock is UTC{:+}min", minutes);
    Ok(())
}

pub fn cmd_settings_auto_start(ws: &Workspace, enabled: bool) -> Result<()> {
    let mut settings = ws.files.load_or_init()?;
    settings.auto_start = enabled;
    ws.files.save(&settings)?;
    println!("Auto-start {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub struct ListArgs {
    pub fields: Vec<String>,
    pub page_size: Option<usize>,
    pub page: usize,
    pub sort: Option<String>,
    pub order: CliSortOrder,
    pub student: Option<String>,
    pub unsent: bool,
}

pub fn cmd_logs_list(ws: &Workspace, args: ListArgs) -> Result<()> {
    let store = ws.store()?;

    if args.unsent || args.student.is_some() {
        let records = if args.unsent {
            store.unsent_logs()?
        } else {
            let id = args.student.unwrap_or_default();
            store.query_where(&|r: &ScanLogRecord| r.student_id == id)?
        };
        for r in &records {
            println!("{}", serde_json::to_string(r)?);
        }
        println!(":: {} logs", records.len());
        return Ok(());
    }

    let mut query = LogQuery::default().fields(args.fields).page(args.page);
    if let Some(size) = args.page_size {
        query = query.page_size(size);
    }
    if let Some(field) = args.sort {
        query = query.sort_by(field, args.order.into());
    }
    let rows = store.query(&query)?;
    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }
    if let Some(at) = store.last_sync_at()? {
        println!(":: {} rows, last sync {}", rows.len(), at.format("%Y-%m-%d %H:%M"));
    } else {
        println!(":: {} rows", rows.len());
    }
    Ok(())
}
