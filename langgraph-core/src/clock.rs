//! The abstract clock external collaborator (`spec.md` §6), enabling
//! deterministic simulated time in tests of the retry/backoff and
//! circuit-breaker logic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// `nowNanoseconds()` / `sleep(nanoseconds)`.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_nanoseconds(&self) -> u64;
    async fn sleep(&self, nanoseconds: u64);
}

/// The real wall clock, backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_nanoseconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is after the epoch")
            .as_nanos() as u64
    }

    async fn sleep(&self, nanoseconds: u64) {
        tokio::time::sleep(std::time::Duration::from_nanos(nanoseconds)).await;
    }
}

/// A clock tests drive explicitly: `sleep` advances an internal
/// counter instead of actually waiting, so retry/backoff scenarios run
/// instantly and deterministically.
#[derive(Default)]
pub struct SimulatedClock {
    elapsed_ns: AtomicU64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now_nanoseconds(&self) -> u64 {
        self.elapsed_ns.load(Ordering::SeqCst)
    }

    async fn sleep(&self, nanoseconds: u64) {
        self.elapsed_ns.fetch_add(nanoseconds, Ordering::SeqCst);
    }
}
