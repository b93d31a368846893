//! Connectivity Dashboard Example
//!
//! This example demonstrates:
//! - Subscribing to connectivity transitions
//! - Probing the health endpoint for a reachability verdict
//! - The background scheduler draining the queue on reconnect
//! - Observing pass summaries through result subscriptions
//!
//! Run with: cargo run -p sync_dashboard

use carnet_engine::{
    ConnectivityMonitor, EngineConfig, HttpResponse, Reconciler, ScriptedClient, SyncScheduler,
};
use carnet_protocol::{BatchOutcome, BatchResponse, HttpMethod, OperationDraft};
use carnet_store::{DurableStore, SystemClock};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Connectivity Dashboard Example");
    println!("==============================\n");

    let store = Arc::new(DurableStore::open_in_memory(Arc::new(SystemClock))?);
    let monitor = Arc::new(ConnectivityMonitor::new(false));
    let client = Arc::new(ScriptedClient::new());
    let config = EngineConfig::new("https://telemetry.example")
        .with_health_endpoint("/healthz")
        .with_sync_interval(Duration::from_secs(60));

    // Every transition is announced exactly once, no matter how many
    // times the same verdict repeats.
    let badge = monitor.subscribe(|online| {
        let state = if online { "ONLINE" } else { "OFFLINE" };
        println!("    [net] link is now {state}");
    });

    // Sensor readings recorded while the collector is unreachable.
    println!("[+] Queueing readings while offline...");
    let readings = [("river-gauge", 3.2), ("rain-north", 0.0), ("rain-south", 1.4)];
    for (sensor, value) in readings {
        let draft = OperationDraft::new(HttpMethod::Post, "/readings")
            .expect("POST is a mutation")
            .with_payload(json!({ "sensor": sensor, "value": value }));
        let id = store.enqueue_operation(draft)?;
        println!("    queued #{id}: {sensor} = {value}");
    }
    println!("[OK] {} readings pending", store.queue_len());

    let reconciler = Arc::new(Reconciler::new(
        config.clone(),
        Arc::clone(&store),
        Arc::clone(&monitor),
        Arc::clone(&client),
    ));
    reconciler.subscribe_results(|summary| {
        println!(
            "    [pass] {} applied, {} failed, {} remaining",
            summary.processed, summary.failed, summary.remaining
        );
    });

    // The scheduler wakes on its interval, and immediately when the
    // monitor flips back online.
    let mut scheduler = SyncScheduler::start(
        Arc::clone(&reconciler),
        Arc::clone(&monitor),
        config.sync_interval,
    );
    println!("[OK] Scheduler running, interval {:?}", config.sync_interval);

    // Nothing is scripted yet, so the probe fails like a dead network.
    println!("\n[*] Probing {} ...", config.health_url());
    let reachable = monitor.probe_reachability(
        client.as_ref(),
        &config.health_url(),
        config.probe_timeout,
    );
    println!("    reachable: {reachable}");

    // The collector comes back. The next probe flips the monitor online,
    // which wakes the scheduler; all three readings fit one batch.
    let verdicts = BatchResponse {
        results: vec![BatchOutcome::success(); readings.len()],
    };
    client.script_response(HttpResponse::new(200, b"ok".to_vec()));
    client.script_response(HttpResponse::new(200, verdicts.encode()?));

    println!("\n[*] Probing again...");
    let reachable = monitor.probe_reachability(
        client.as_ref(),
        &config.health_url(),
        config.probe_timeout,
    );
    println!("    reachable: {reachable}");

    // The drain happens on the scheduler's worker thread.
    for _ in 0..50 {
        if store.queue_len() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(40));
    }

    let status = store.read_sync_status();
    println!(
        "\n[#] Dashboard: phase {}, pending {}, last sync at {:?}",
        status.phase, status.pending_count, status.last_sync_ms
    );

    println!("\n[!] Link drops again");
    monitor.mark_offline();

    scheduler.stop();
    monitor.unsubscribe(badge);
    println!("\n[*] Scheduler stopped; dashboard closed");
    Ok(())
}
