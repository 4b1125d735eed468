//! Admission control for free-tier provider APIs.
//!
//! Two regimes compose here. The per-minute window is self-healing: when full
//! it sleeps until the oldest call ages out, then proceeds. The daily quota is
//! a hard wall: once spent it fails fast with the reset time, because sleeping
//! hours inside a request path helps nobody.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use screener_core::ScreenerError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Padding added to window sleeps so a wakeup never lands a hair early.
const WINDOW_MARGIN: Duration = Duration::from_secs(1);

/// Sliding-window limiter: at most `max_calls` in any trailing `window`.
#[derive(Clone)]
pub struct SlidingWindow {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_calls: usize,
    window: Duration,
}

impl SlidingWindow {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_calls,
            window,
        }
    }

    /// Block until a slot is free, then record the call.
    pub async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Drop timestamps that have aged out of the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_calls {
                ts.push_back(now);
                return;
            }

            // Wait for the oldest call to fall out, then re-evaluate
            let oldest = *ts.front().unwrap();
            let elapsed = now.duration_since(oldest);
            let sleep_dur = self.window.saturating_sub(elapsed) + WINDOW_MARGIN;
            drop(ts);
            tracing::debug!(
                "rate limiter: window full, waiting {:.1}s for a slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Calendar-day call counter. Resets at the UTC day boundary, not 24h after
/// the first call.
pub struct DailyQuota {
    cap: u32,
    state: Mutex<DailyState>,
}

struct DailyState {
    day: NaiveDate,
    used: u32,
}

impl DailyQuota {
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            state: Mutex::new(DailyState {
                day: Utc::now().date_naive(),
                used: 0,
            }),
        }
    }

    /// Consume one call for `today`, or report when the quota reopens.
    pub async fn try_acquire(&self, today: NaiveDate) -> Result<u32, DateTime<Utc>> {
        let mut state = self.state.lock().await;
        if state.day != today {
            state.day = today;
            state.used = 0;
        }
        if state.used >= self.cap {
            return Err(next_midnight_utc(today));
        }
        state.used += 1;
        Ok(self.cap - state.used)
    }

    pub async fn remaining(&self, today: NaiveDate) -> u32 {
        let state = self.state.lock().await;
        if state.day != today {
            self.cap
        } else {
            self.cap.saturating_sub(state.used)
        }
    }
}

fn next_midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    let next = day.succ_opt().unwrap_or(day);
    Utc.with_ymd_and_hms(next.year(), next.month(), next.day(), 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Minute window plus daily cap, serialized per provider instance.
pub struct ProviderLimiter {
    provider: &'static str,
    window: SlidingWindow,
    daily: DailyQuota,
}

impl ProviderLimiter {
    pub fn new(provider: &'static str, per_minute: usize, per_day: u32) -> Self {
        Self {
            provider,
            window: SlidingWindow::new(per_minute, Duration::from_secs(60)),
            daily: DailyQuota::new(per_day),
        }
    }

    /// Admit one call: daily quota is checked first (hard failure), then the
    /// minute window (blocks until a slot opens).
    pub async fn admit(&self) -> Result<(), ScreenerError> {
        let today = Utc::now().date_naive();
        let remaining = self.daily.try_acquire(today).await.map_err(|resets_at| {
            tracing::warn!(
                provider = self.provider,
                %resets_at,
                "daily quota exhausted"
            );
            ScreenerError::QuotaExhausted {
                provider: self.provider,
                resets_at,
            }
        })?;
        if remaining <= 3 {
            tracing::warn!(
                provider = self.provider,
                remaining,
                "daily quota nearly exhausted"
            );
        }
        self.window.acquire().await;
        Ok(())
    }

    pub async fn remaining_today(&self) -> u32 {
        self.daily.remaining(Utc::now().date_naive()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test(start_paused = true)]
    async fn test_window_admits_up_to_capacity_without_waiting() {
        let limiter = SlidingWindow::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now().duration_since(start), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_blocks_fourth_call_until_oldest_expires() {
        let limiter = SlidingWindow::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        let start = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(start);
        assert!(waited >= Duration::from_secs(60));
        // Margin keeps the wait close to one window, not multiples of it
        assert!(waited < Duration::from_secs(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_frees_slots_as_calls_age_out() {
        let limiter = SlidingWindow::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        // First call aged out, so two fresh slots are available instantly
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(Instant::now().duration_since(start), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_daily_quota_fails_fast_when_spent() {
        let quota = DailyQuota::new(2);
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        assert_eq!(quota.try_acquire(day).await, Ok(1));
        assert_eq!(quota.try_acquire(day).await, Ok(0));

        let resets_at = quota.try_acquire(day).await.unwrap_err();
        assert_eq!(
            resets_at,
            Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_daily_quota_resets_on_date_change_not_elapsed_time() {
        let quota = DailyQuota::new(1);
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        assert!(quota.try_acquire(monday).await.is_ok());
        assert!(quota.try_acquire(monday).await.is_err());
        assert!(quota.try_acquire(tuesday).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_limiter_surfaces_quota_error() {
        let limiter = ProviderLimiter::new("testprov", 10, 1);
        assert!(limiter.admit().await.is_ok());
        let err = limiter.admit().await.unwrap_err();
        assert!(err.is_quota_exhausted());
        assert_eq!(limiter.remaining_today().await, 0);
    }
}
