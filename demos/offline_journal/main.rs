//! Offline Field Journal Example
//!
//! This example demonstrates core carnet functionality:
//! - Routing reads and writes through the offline gateway
//! - Serving cached GET responses during an outage
//! - Capturing mutations in the durable queue, across a restart
//! - Draining the queue with batched replay once the link returns
//!
//! The server side is played by a scripted HTTP client, so the example
//! runs without any network access.
//!
//! Run with: cargo run -p offline_journal

use carnet_engine::{
    CachePolicy, ConnectivityMonitor, EngineConfig, EngineError, FetchResult, HttpRequest,
    HttpResponse, OfflineGateway, Reconciler, ScriptedClient, TransportError,
};
use carnet_store::{DurableStore, ManualClock};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// One inspection entry, as the journal app would post it.
#[derive(Debug, Clone)]
struct JournalEntry {
    site: String,
    note: String,
    severity: u8,
}

impl JournalEntry {
    fn new(site: &str, note: &str, severity: u8) -> Self {
        Self {
            site: site.to_string(),
            note: note.to_string(),
            severity,
        }
    }

    /// The JSON body the inspections API expects.
    fn to_json(&self) -> serde_json::Value {
        json!({
            "site": self.site,
            "note": self.note,
            "severity": self.severity,
        })
    }
}

/// Engine settings shared by both halves of the restart.
fn engine_config() -> EngineConfig {
    EngineConfig::new("https://api.fieldops.example")
        .with_batch_size(3)
        .with_default_max_retries(3)
}

/// Site listings may be served stale for up to fifteen minutes.
fn journal_policy() -> CachePolicy {
    CachePolicy::new().with_rule("/sites", "sites", Some(Duration::from_secs(15 * 60)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Offline Field Journal Example");
    println!("=============================\n");

    // A manual clock stands in for wall time so cache expiry can be
    // shown without sleeping.
    let dir = TempDir::new()?;
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(DurableStore::open(dir.path(), clock.clone())?);
    println!("[OK] Durable store opened at {}", dir.path().display());

    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let client = Arc::new(ScriptedClient::new());
    let gateway = OfflineGateway::new(
        engine_config(),
        Arc::clone(&store),
        Arc::clone(&monitor),
        Arc::clone(&client),
        journal_policy(),
    );

    // While the link is up, reads hit the server and refresh the cache.
    let sites = json!([
        { "id": 1, "name": "North ridge pump house" },
        { "id": 2, "name": "River intake" },
    ]);
    client.script_response(HttpResponse::new(200, serde_json::to_vec(&sites)?));

    println!("\n[*] Fetching the site list while online...");
    match gateway.execute(HttpRequest::get("/sites?region=north"))? {
        FetchResult::Response {
            response,
            from_cache,
        } => {
            let body: serde_json::Value = serde_json::from_slice(&response.body)?;
            let count = body.as_array().map_or(0, |list| list.len());
            println!(
                "    status {}, from_cache {}, {} sites on file",
                response.status, from_cache, count
            );
        }
        other => println!("    unexpected outcome: {other:?}"),
    }

    // The radio link drops. Reads still try the wire; the transport
    // failure is what proves the outage, and the cache answers instead.
    println!("\n[!] Radio link lost");
    monitor.mark_offline();

    client.script_transport_error(TransportError::timed_out("no route to host"));
    println!("[*] Fetching the site list during the outage...");
    match gateway.execute(HttpRequest::get("/sites?region=north"))? {
        FetchResult::Response { from_cache, .. } => {
            println!("    served from cache: {from_cache}");
        }
        other => println!("    unexpected outcome: {other:?}"),
    }

    // Entries recorded in the field land in the durable queue.
    let entries = vec![
        JournalEntry::new("north-ridge", "Pressure gauge reads 12% low", 2),
        JournalEntry::new("river-intake", "Debris screen clear", 0),
        JournalEntry::new("north-ridge", "Replaced gauge, re-checked", 1),
    ];

    println!("\n[+] Recording {} entries offline...", entries.len());
    for entry in &entries {
        let request = HttpRequest::post("/inspections", serde_json::to_vec(&entry.to_json())?)
            .with_header("x-device", "tablet-7");
        match gateway.execute(request)? {
            FetchResult::Queued { operation_id } => {
                println!("    queued #{operation_id}: {}", entry.note);
            }
            other => println!("    unexpected outcome: {other:?}"),
        }
        clock.advance(Duration::from_secs(30));
    }

    let status = store.read_sync_status();
    println!(
        "[OK] {} operations pending, phase {}",
        status.pending_count, status.phase
    );

    // The app restarts. Everything in memory goes away; the queue
    // and the cache come back from disk.
    println!("\n[~] Restarting the app...");
    drop(gateway);
    drop(store);

    let store = Arc::new(DurableStore::open(dir.path(), clock.clone())?);
    println!("[OK] Queue survived the restart: {} operations", store.queue_len());

    let monitor = Arc::new(ConnectivityMonitor::new(false));
    let client = Arc::new(ScriptedClient::new());
    let gateway = OfflineGateway::new(
        engine_config(),
        Arc::clone(&store),
        Arc::clone(&monitor),
        Arc::clone(&client),
        journal_policy(),
    );
    let reconciler = Reconciler::new(
        engine_config(),
        Arc::clone(&store),
        Arc::clone(&monitor),
        Arc::clone(&client),
    );
    reconciler.subscribe_results(|summary| {
        println!(
            "    pass finished: {} applied, {} failed, {} remaining",
            summary.processed, summary.failed, summary.remaining
        );
    });

    // The link returns. One pass drains the queue oldest-first; the
    // batch endpoint buckles, so the engine retries each entry on
    // its own before giving up on any of them.
    println!("\n[*] Link restored; draining the queue...");
    monitor.set_online(true);

    client.script_response(HttpResponse::new(500, b"overloaded".to_vec()));
    for _ in 0..entries.len() {
        client.script_response(HttpResponse::new(200, b"{}".to_vec()));
    }

    let summary = reconciler.run_pass()?;
    println!(
        "[OK] Drained in {} requests (1 batch attempt + {} individual replays)",
        client.request_count(),
        summary.processed
    );
    for recorded in client.requests() {
        println!("    {} {}", recorded.method, recorded.url);
    }

    let status = store.read_sync_status();
    println!(
        "\n[#] Sync status: phase {}, pending {}, last error {:?}",
        status.phase, status.pending_count, status.last_error
    );

    // Sixteen minutes later the cached site list has aged out, so an
    // outage read has nothing left to fall back on.
    clock.advance(Duration::from_secs(16 * 60));
    client.script_transport_error(TransportError::timed_out("no route to host"));

    println!("[*] Sixteen minutes later, reading through another outage...");
    match gateway.execute(HttpRequest::get("/sites?region=north")) {
        Err(EngineError::Unreachable { .. }) => {
            println!("[!] Cached copy expired; the read fails until the link returns");
        }
        other => println!("    unexpected outcome: {other:?}"),
    }

    println!("\n[*] All {} journal entries delivered", entries.len());
    Ok(())
}
