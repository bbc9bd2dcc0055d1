//! Example: driving the retry engine by hand
//!
//! This example demonstrates:
//! 1. The default linear schedule retrying a transient failure
//! 2. A fatal status short-circuiting the loop
//! 3. Swapping in a jittered exponential schedule
//!
//! Run with:
//! ```bash
//! cargo run -p steadycall-core --example retry_engine
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use steadycall_core::prelude::*;

/// A simulated service that is unavailable for its first few calls
struct FlakyService {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyService {
    fn new(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }

    async fn call(&self) -> CallOutcome<&'static str> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            println!("  Attempt {}: UNAVAILABLE", call + 1);
            Err(Failure::protocol(Code::Unavailable, "warming up"))
        } else {
            println!("  Attempt {}: OK", call + 1);
            Ok("pong")
        }
    }
}

async fn linear_retry() {
    println!("\n=== Example 1: Linear backoff (scaled down to milliseconds) ===\n");

    let engine = RetryEngine::builder()
        .backoff(LinearBackoff::new(
            Duration::from_millis(30),
            Duration::from_millis(10),
        ))
        .build();
    let service = FlakyService::new(2);
    let start = Instant::now();

    let report = engine
        .run(
            |_| service.call(),
            |event| {
                println!("  -> {}, retrying in {:?}", event.decision, event.wait);
                std::future::ready(())
            },
        )
        .await;

    println!(
        "\nOutcome: {:?} after {} attempts ({:?} backoff, {:?} wall)",
        report.outcome,
        report.attempts,
        report.waited,
        start.elapsed()
    );
}

async fn fatal_short_circuit() {
    println!("\n=== Example 2: Fatal status is never retried ===\n");

    let engine = RetryEngine::default();
    let outcome: CallOutcome<()> = engine
        .execute(|ctx| async move {
            println!("  Attempt {}: INVALID_ARGUMENT", ctx.attempt() + 1);
            Err(Failure::protocol(Code::InvalidArgument, "name is required"))
        })
        .await;

    println!("\nOutcome: {outcome:?}");
}

async fn exponential_retry() {
    println!("\n=== Example 3: Jittered exponential backoff ===\n");

    let backoff = ExponentialBackoff::builder()
        .base(Duration::from_millis(20))
        .factor(2.0)
        .jitter(0.2)
        .build();
    println!("  Sampled total wait for 3 retries: {:?}", backoff.total_wait(3));

    let engine = RetryEngine::builder().backoff(backoff).build();
    let service = FlakyService::new(3);
    let outcome = engine.execute(|_| service.call()).await;

    println!("\nOutcome: {outcome:?}");
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    linear_retry().await;
    fatal_short_circuit().await;
    exponential_retry().await;
}
