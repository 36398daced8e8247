use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cooperative, single-writer/multi-reader boolean. A worker sets it upon
/// reaching its main loop (advertising "I am running") and the manager
/// clears it to request a stop. No worker is ever preempted; it only checks
/// the flag at its own blocking points.
#[derive(Clone, Default)]
pub struct LiveFlag {
    flag: Arc<AtomicBool>,
}

impl LiveFlag {
    pub fn new() -> Self {
        LiveFlag {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Polls until set or `timeout` elapses. Used by the manager to confirm
    /// startup; never blocks indefinitely.
    pub async fn wait_until_set(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_clear_round_trip() {
        let flag = LiveFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.clear();
        assert!(!flag.is_set());
    }

    #[tokio::test]
    async fn wait_until_set_returns_true_once_another_clone_sets_it() {
        let flag = LiveFlag::new();
        let setter = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set();
        });
        assert!(flag.wait_until_set(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn wait_until_set_times_out_if_never_set() {
        let flag = LiveFlag::new();
        assert!(!flag.wait_until_set(Duration::from_millis(30)).await);
    }
}
