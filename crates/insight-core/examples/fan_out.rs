//! Example: cache-first insight generation against simulated upstreams
//!
//! Run with: RUST_LOG=debug cargo run --example fan_out

use insight_core::{
    InsightConfig, InsightEngine, InsightError, RequestContext, SimulatedProfileProvider,
    SimulatedTransactionsProvider,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    env_logger::init();

    let engine = InsightEngine::new(
        Arc::new(SimulatedProfileProvider::default()),
        Arc::new(SimulatedTransactionsProvider::new(Duration::from_millis(400))),
        InsightConfig::default(),
    );

    println!("Insight Engine Demo\n");

    for round in 1..=2 {
        let ctx = RequestContext::with_timeout(Duration::from_secs(2));
        match engine.generate(&ctx, "abc123").await {
            Ok(result) => println!(
                "round {}: {} (cached: {})",
                round, result.insight, result.cached
            ),
            Err(e) => println!("round {}: error: {}", round, e),
        }
    }

    // A slow transactions service against a tight deadline
    let slow = InsightEngine::new(
        Arc::new(SimulatedProfileProvider::default()),
        Arc::new(SimulatedTransactionsProvider::default()),
        InsightConfig::default(),
    );
    let ctx = RequestContext::with_timeout(Duration::from_millis(500));
    match slow.generate(&ctx, "xyz789").await {
        Err(InsightError::DeadlineExceeded) => println!("slow upstream: deadline exceeded"),
        other => println!("slow upstream: {:?}", other.map(|r| r.insight)),
    }

    for status in slow.dependency_status() {
        println!(
            "{}: circuit {:?}, {} failures, {} in flight",
            status.dependency, status.circuit, status.consecutive_failures, status.in_flight
        );
    }
}
