use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How often stale failure counters are evicted.
pub const LOGIN_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Per-address failure counter with a temporary block.
///
/// The block window starts at the failure that reaches `max_attempts`.
/// Failures recorded while already blocked do not extend it. The first
/// failure after a block has run out starts a fresh count.
#[derive(Clone, Debug)]
pub struct LoginThrottle {
    inner: Arc<LoginThrottleInner>,
}

#[derive(Debug)]
struct LoginThrottleInner {
    entries: RwLock<HashMap<IpAddr, FailureEntry>>,
    max_attempts: u32,
    block_duration: Duration,
}

#[derive(Debug, Clone)]
struct FailureEntry {
    failures: u32,
    /// First failure since reset, re-armed at the threshold crossing.
    blocked_at: Instant,
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, block_duration: Duration) -> Self {
        Self {
            inner: Arc::new(LoginThrottleInner {
                entries: RwLock::new(HashMap::new()),
                max_attempts,
                block_duration,
            }),
        }
    }

    /// `(blocked, retry_after_secs)`.
    pub async fn is_blocked(&self, addr: IpAddr) -> (bool, u64) {
        let entries = self.inner.entries.read().await;

        let Some(entry) = entries.get(&addr) else {
            return (false, 0);
        };
        if entry.failures < self.inner.max_attempts {
            return (false, 0);
        }

        let remaining = self
            .inner
            .block_duration
            .saturating_sub(entry.blocked_at.elapsed());
        if remaining.is_zero() {
            return (false, 0);
        }

        (true, ceil_secs(remaining))
    }

    pub async fn record_failure(&self, addr: IpAddr) {
        let mut entries = self.inner.entries.write().await;
        let now = Instant::now();

        let entry = entries.entry(addr).or_insert(FailureEntry {
            failures: 0,
            blocked_at: now,
        });
        if entry.failures >= self.inner.max_attempts
            && entry.blocked_at.elapsed() >= self.inner.block_duration
        {
            entry.failures = 0;
            entry.blocked_at = now;
        }
        entry.failures = entry.failures.saturating_add(1);

        if entry.failures == self.inner.max_attempts {
            entry.blocked_at = now;
            warn!(
                address = %addr,
                failures = entry.failures,
                "Login attempts exhausted, blocking for {:?}",
                self.inner.block_duration
            );
        } else {
            debug!(address = %addr, failures = entry.failures, "Login failure recorded");
        }
    }

    pub async fn reset_failures(&self, addr: IpAddr) {
        if self.inner.entries.write().await.remove(&addr).is_some() {
            debug!(address = %addr, "Login failures reset");
        }
    }

    /// Drop entries whose block window has fully elapsed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        let block = self.inner.block_duration;
        entries.retain(|_, entry| entry.blocked_at.elapsed() <= block);

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Swept login throttle");
        }
        evicted
    }

    pub async fn tracked_addresses(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let throttle = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                throttle.sweep().await;
            }
        })
    }
}

pub(crate) fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> IpAddr {
        IpAddr::from([192, 168, 1, last])
    }

    #[tokio::test]
    async fn blocks_at_threshold_only_for_that_address() {
        let throttle = LoginThrottle::new(3, Duration::from_secs(900));
        let x = addr(1);
        let y = addr(2);

        for _ in 0..2 {
            throttle.record_failure(x).await;
        }
        assert_eq!(throttle.is_blocked(x).await, (false, 0));

        throttle.record_failure(x).await;
        let (blocked, retry_after) = throttle.is_blocked(x).await;
        assert!(blocked);
        assert!(retry_after > 0 && retry_after <= 900);

        assert_eq!(throttle.is_blocked(y).await, (false, 0));

        throttle.reset_failures(x).await;
        assert_eq!(throttle.is_blocked(x).await, (false, 0));
    }

    #[tokio::test]
    async fn failures_while_blocked_do_not_extend_block() {
        let throttle = LoginThrottle::new(2, Duration::from_millis(600));
        let x = addr(1);

        throttle.record_failure(x).await;
        throttle.record_failure(x).await;
        assert!(throttle.is_blocked(x).await.0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        throttle.record_failure(x).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!throttle.is_blocked(x).await.0);
    }

    #[tokio::test]
    async fn failures_after_block_expiry_reblock() {
        let throttle = LoginThrottle::new(2, Duration::from_millis(200));
        let x = addr(1);

        throttle.record_failure(x).await;
        throttle.record_failure(x).await;
        assert!(throttle.is_blocked(x).await.0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!throttle.is_blocked(x).await.0);

        // One failure after expiry is a fresh first attempt.
        throttle.record_failure(x).await;
        assert!(!throttle.is_blocked(x).await.0);

        throttle.record_failure(x).await;
        let (blocked, retry_after) = throttle.is_blocked(x).await;
        assert!(blocked);
        assert_eq!(retry_after, 1);

        for _ in 0..50 {
            throttle.record_failure(x).await;
        }
        assert!(throttle.is_blocked(x).await.0);
    }

    #[tokio::test]
    async fn sweep_evicts_elapsed_entries() {
        let throttle = LoginThrottle::new(3, Duration::from_millis(100));
        throttle.record_failure(addr(1)).await;
        throttle.record_failure(addr(2)).await;
        assert_eq!(throttle.tracked_addresses().await, 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        throttle.record_failure(addr(3)).await;

        assert_eq!(throttle.sweep().await, 2);
        assert_eq!(throttle.tracked_addresses().await, 1);
    }

    #[tokio::test]
    async fn sweeper_task_runs_periodically() {
        let throttle = LoginThrottle::new(3, Duration::from_millis(10));
        throttle.record_failure(addr(1)).await;

        let handle = throttle.spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(throttle.tracked_addresses().await, 0);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
    }
}
