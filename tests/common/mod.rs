//! Common test utilities shared across integration tests.

use jobwarden::ExecutionRecord;
use jobwarden::testing::TestHarness;
use std::time::Duration;

/// Wait until `count` records have reached a terminal status, polling the
/// harness repository.
///
/// This is more reliable than fixed sleeps since execution time can vary.
/// Polls every 10ms.
///
/// # Panics
///
/// Panics if the timeout is reached first.
pub async fn wait_for_terminal_records(
    harness: &TestHarness,
    count: usize,
    timeout: Duration,
) -> Vec<ExecutionRecord> {
    let start = tokio::time::Instant::now();
    loop {
        let records = harness.records();
        let terminal = records.iter().filter(|r| r.status.is_terminal()).count();
        if terminal >= count {
            return records;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for {} terminal record(s), have: {:?}",
                count,
                records.iter().map(|r| r.status).collect::<Vec<_>>()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until `condition` holds, polling every 10ms.
///
/// # Panics
///
/// Panics if the timeout is reached first.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            panic!("Timeout after {:?} waiting for condition", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
