use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction to enforce deterministic time sourcing in core paths.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    /// Wall-clock milliseconds since the Unix epoch, used in event envelopes.
    fn now_millis(&self) -> u64;
    fn sleep(&self, duration: Duration) -> tokio::time::Sleep;
}

/// System-backed clock; replaceable in tests or deterministic replay.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(duration)
    }
}
