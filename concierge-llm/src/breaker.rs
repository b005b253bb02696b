//! Availability breaker
//!
//! Guards every generative backend call. After `failure_threshold`
//! consecutive failures the breaker opens and calls fail with
//! `LlmError::BackendUnavailable` without reaching the backend. Once the
//! cooldown has elapsed exactly one caller is granted a trial call; its
//! outcome closes or reopens the breaker.
//!
//! All state is atomic. Nothing is locked across an `.await`.

use concierge_core::{BreakerConfig, CircuitState, HealthCheck, LlmError, LlmResult};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Availability breaker for a single backend.
pub struct AvailabilityBreaker {
    state: AtomicU8,
    failure_count: AtomicU32,
    /// Milliseconds since `epoch` at which the breaker last opened.
    opened_at_ms: AtomicU64,
    epoch: Instant,
    failure_threshold: u32,
    cooldown: Duration,
}

impl AvailabilityBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self::with_settings(config.failure_threshold, config.cooldown())
    }

    pub fn with_settings(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn cooldown_ms(&self) -> u64 {
        self.cooldown.as_millis() as u64
    }

    /// Ask for permission to call the backend.
    ///
    /// An open breaker past its cooldown hands the trial permit to whichever
    /// caller wins the `Open -> HalfOpen` compare-and-swap. Everyone else is
    /// rejected until the trial settles.
    pub fn try_acquire(&self) -> LlmResult<BreakerPermit<'_>> {
        loop {
            match self.state() {
                CircuitState::Closed => {
                    return Ok(BreakerPermit {
                        breaker: self,
                        trial: false,
                        settled: false,
                    })
                }
                CircuitState::Open => {
                    let opened_at = self.opened_at_ms.load(Ordering::SeqCst);
                    let elapsed = self.now_ms().saturating_sub(opened_at);
                    if elapsed < self.cooldown_ms() {
                        return Err(LlmError::BackendUnavailable {
                            retry_after_ms: (self.cooldown_ms() - elapsed) as i64,
                        });
                    }
                    if self
                        .state
                        .compare_exchange(
                            CircuitState::Open as u8,
                            CircuitState::HalfOpen as u8,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        tracing::info!("availability breaker half-open, admitting trial call");
                        return Ok(BreakerPermit {
                            breaker: self,
                            trial: true,
                            settled: false,
                        });
                    }
                    // Lost the race; re-read the new state.
                }
                CircuitState::HalfOpen => {
                    return Err(LlmError::BackendUnavailable {
                        retry_after_ms: self.cooldown_ms() as i64,
                    })
                }
            }
        }
    }

    /// Run `op` under the breaker. `op` is never invoked while open.
    pub async fn execute<T, F, Fut>(&self, op: F) -> LlmResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        let permit = self.try_acquire()?;
        match op().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(e) => {
                permit.record_failure();
                Err(e)
            }
        }
    }

    fn on_success(&self, trial: bool) {
        self.failure_count.store(0, Ordering::SeqCst);
        if trial {
            self.state
                .store(CircuitState::Closed as u8, Ordering::SeqCst);
            tracing::info!("availability breaker closed after successful trial");
        }
    }

    fn on_failure(&self, trial: bool) {
        if trial {
            self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
            self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
            tracing::warn!("availability breaker trial failed, reopening");
            return;
        }

        // A normal permit issued before the breaker opened must not move its clock.
        if self.state() != CircuitState::Closed {
            return;
        }

        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.failure_threshold {
            self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
            if self
                .state
                .compare_exchange(
                    CircuitState::Closed as u8,
                    CircuitState::Open as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                tracing::warn!(
                    failures = count,
                    cooldown_ms = self.cooldown_ms(),
                    "availability breaker opened"
                );
            }
        }
    }

    fn on_abandoned_trial(&self) {
        // Opened-at is untouched, so the next caller may trial straight away.
        let _ = self.state.compare_exchange(
            CircuitState::HalfOpen as u8,
            CircuitState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        tracing::debug!("availability breaker trial abandoned");
    }

    /// Health snapshot.
    pub fn health(&self) -> HealthCheck {
        let state = self.state();
        let check = match state {
            CircuitState::Closed => HealthCheck::healthy("generative_backend"),
            CircuitState::HalfOpen => {
                HealthCheck::degraded("generative_backend", "trial call in flight")
            }
            CircuitState::Open => {
                HealthCheck::unhealthy("generative_backend", "availability breaker open")
            }
        };
        check
            .with_metadata("state", serde_json::json!(state.as_str()))
            .with_metadata("failure_count", serde_json::json!(self.failure_count()))
    }
}

impl std::fmt::Debug for AvailabilityBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityBreaker")
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

// ============================================================================
// PERMIT
// ============================================================================

/// Permission for one backend call.
///
/// Must be settled with `record_success` or `record_failure`. A trial permit
/// dropped unsettled (the caller was cancelled) returns the breaker to open.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a AvailabilityBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.on_abandoned_trial();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn failing() -> LlmResult<()> {
        Err(LlmError::RequestFailed {
            provider: "test".to_string(),
            status: 500,
            message: "boom".to_string(),
        })
    }

    async fn trip(breaker: &AvailabilityBreaker, times: u32) {
        for _ in 0..times {
            let _ = breaker.execute(|| async { failing() }).await;
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = AvailabilityBreaker::with_settings(3, Duration::from_secs(60));
        trip(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = AvailabilityBreaker::with_settings(3, Duration::from_secs(60));
        trip(&breaker, 2).await;
        breaker.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);
        trip(&breaker, 2).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_breaker_never_invokes_op() {
        let breaker = AvailabilityBreaker::with_settings(1, Duration::from_secs(60));
        trip(&breaker, 1).await;

        let calls = AtomicUsize::new(0);
        let result = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(LlmError::BackendUnavailable { retry_after_ms }) if retry_after_ms > 0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trial_success_closes() {
        let breaker = AvailabilityBreaker::with_settings(1, Duration::ZERO);
        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens() {
        let breaker = AvailabilityBreaker::with_settings(1, Duration::ZERO);
        trip(&breaker, 1).await;

        let permit = breaker.try_acquire().unwrap();
        assert!(permit.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        permit.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_rejects_concurrent_callers() {
        let breaker = AvailabilityBreaker::with_settings(1, Duration::ZERO);
        trip(&breaker, 1).await;

        let trial = breaker.try_acquire().unwrap();
        let calls = AtomicUsize::new(0);
        for _ in 0..5 {
            let result = breaker
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert!(matches!(result, Err(LlmError::BackendUnavailable { .. })));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        trial.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_abandoned_trial_returns_to_open() {
        let breaker = AvailabilityBreaker::with_settings(1, Duration::ZERO);
        breaker.try_acquire().unwrap().record_failure();

        {
            let _trial = breaker.try_acquire().unwrap();
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cooldown already elapsed, so the next caller trials immediately.
        let next = breaker.try_acquire().unwrap();
        assert!(next.is_trial());
        next.record_success();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_one_concurrent_trial() {
        let breaker = Arc::new(AvailabilityBreaker::with_settings(1, Duration::ZERO));
        breaker.try_acquire().unwrap().record_failure();

        let contenders = 16;
        let barrier = Arc::new(tokio::sync::Barrier::new(contenders));
        let mut handles = Vec::new();
        for _ in 0..contenders {
            let breaker = Arc::clone(&breaker);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                let permit = breaker.try_acquire();
                let won = matches!(&permit, Ok(p) if p.is_trial());
                // Hold every permit until all contenders have tried.
                barrier.wait().await;
                drop(permit);
                won
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_health_reflects_state() {
        let breaker = AvailabilityBreaker::with_settings(1, Duration::from_secs(60));
        assert!(breaker.health().is_healthy());
        breaker.try_acquire().unwrap().record_failure();
        let health = breaker.health();
        assert_eq!(health.status, concierge_core::HealthStatus::Unhealthy);
        assert_eq!(
            health.metadata.get("state"),
            Some(&serde_json::json!("open"))
        );
    }
}
