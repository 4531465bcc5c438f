use std::time::Duration;

use wb_core::RetryPolicy;

/// Timeout por intento + política de reintentos, común a las tres etapas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(5),
               retry: RetryPolicy::default() }
    }
}
