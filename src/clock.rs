use time::OffsetDateTime;

/// Time source for TTL and cooldown logic.
///
/// The caches take a clock instead of calling `OffsetDateTime::now_utc()`
/// directly so expiry behavior is deterministically testable.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
