//! Política de reintentos con backoff exponencial acotado.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Intentos totales por etapa (incluye el primero).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3,
               base_delay: Duration::from_millis(200),
               max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1),
               base_delay,
               max_delay }
    }

    /// Espera antes del reintento número `retries_used + 1`.
    pub fn backoff(&self, retries_used: u32) -> Duration {
        let exp = 1u64 << retries_used.min(20);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(exp).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
