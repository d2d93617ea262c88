use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use super::login_throttle::ceil_secs;

/// How often expired windows are evicted.
pub const API_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Fixed-window request counter per IP address
#[derive(Clone, Debug)]
pub struct ApiThrottle {
    inner: Arc<ApiThrottleInner>,
}

#[derive(Debug)]
struct ApiThrottleInner {
    windows: RwLock<HashMap<IpAddr, Window>>,
    limit: u32,
    window: Duration,
}

#[derive(Debug, Clone)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl ApiThrottle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(ApiThrottleInner {
                windows: RwLock::new(HashMap::new()),
                limit,
                window,
            }),
        }
    }

    /// Count one request. `Err(retry_after_secs)` once the window is full.
    pub async fn check(&self, addr: IpAddr) -> Result<(), u64> {
        let mut windows = self.inner.windows.write().await;
        let now = Instant::now();

        match windows.get_mut(&addr) {
            Some(w) if now <= w.reset_at => {
                if w.count >= self.inner.limit {
                    return Err(ceil_secs(w.reset_at - now).max(1));
                }
                w.count += 1;
            }
            _ => {
                windows.insert(
                    addr,
                    Window {
                        count: 1,
                        reset_at: now + self.inner.window,
                    },
                );
            }
        }

        Ok(())
    }

    /// Remove windows that already reset.
    pub async fn sweep(&self) -> usize {
        let mut windows = self.inner.windows.write().await;
        let before = windows.len();
        let now = Instant::now();
        windows.retain(|_, w| now <= w.reset_at);

        let evicted = before - windows.len();
        if evicted > 0 {
            debug!(evicted, "Swept API throttle");
        }
        evicted
    }

    pub async fn tracked_addresses(&self) -> usize {
        self.inner.windows.read().await.len()
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let throttle = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                throttle.sweep().await;
            }
        })
    }
}
