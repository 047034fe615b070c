//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness).
//! Production code uses [`SystemEnv`]; tests use
//! [`test_utils::MockEnv`] with a deterministic id sequence and explicit
//! instants fed through `Tick` events.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments may substitute virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// The only async method in the trait; used by driver code only, never
    /// by protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for correlation ids and session nonces.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment backed by the OS clock and entropy source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buffer);
    }
}

/// Test doubles for the [`Environment`] trait.
pub mod test_utils {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };
    use std::time::Duration;

    use super::Environment;

    /// Deterministic environment for tests.
    ///
    /// Random bytes come from an incrementing counter, so the first
    /// `random_u64()` is 1, the second 2, and so on — correlation ids in
    /// tests are predictable. Time is the real monotonic clock; tests that
    /// care about elapsed time pass explicit instants through `Tick`.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        counter: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Create a fresh mock environment with the counter at zero.
        #[must_use]
        pub fn new() -> Self {
            Self { counter: Arc::new(AtomicU64::new(0)) }
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let value = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let bytes = value.to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = bytes[i % bytes.len()];
            }
        }
    }
}
