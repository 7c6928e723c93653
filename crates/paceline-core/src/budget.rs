//! Sliding-window cost budget shared across workers.
//!
//! Every scoring call consumes a caller-declared cost; the backend enforces
//! a ceiling on cost consumed per trailing minute. Workers ask this tracker
//! for admission before each call so the batch as a whole stays under that
//! ceiling instead of discovering it through rejected requests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window length used for the scoring backend's per-minute ceiling.
pub const BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// One unit of recorded consumption. Immutable once appended; aged out of
/// the window by the purge scan.
#[derive(Debug, Clone, Copy)]
struct UsageRecord {
    cost: u64,
    at: Instant,
}

/// Shared admission gate. Workers call [`BudgetTracker::await_admission`]
/// before each backend call; the tracker keeps the sum of recorded cost in
/// the trailing window at or below `limit`, except when an external quota
/// signal forces a correction via [`BudgetTracker::push_external_cost`].
///
/// All record state lives behind one mutex; the record list is never
/// exposed. This type never errors.
#[derive(Debug)]
pub struct BudgetTracker {
    limit: u64,
    window: Duration,
    records: Mutex<VecDeque<UsageRecord>>,
}

impl BudgetTracker {
    /// Create a tracker with the given cost ceiling per `window`.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a tracker with the standard 60-second window.
    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, BUDGET_WINDOW)
    }

    /// The cost ceiling per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Try to admit `cost` units. Returns `Duration::ZERO` when admitted
    /// (the usage is recorded at the current time). Otherwise returns how
    /// long to wait before enough old records age out for `cost` to fit:
    /// records are scanned oldest-first and the hint is the expiry offset
    /// of the record whose cumulative cost first covers the shortfall. If
    /// no drain point inside the window covers it (e.g. `cost` exceeds the
    /// whole limit), the full window length is returned as a conservative
    /// upper bound.
    pub fn try_admit(&self, cost: u64) -> Duration {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        purge_expired(&mut records, now, self.window);

        let in_window: u64 = records.iter().map(|r| r.cost).sum();
        if in_window + cost <= self.limit {
            records.push_back(UsageRecord { cost, at: now });
            return Duration::ZERO;
        }

        let shortfall = in_window + cost - self.limit;
        let mut drained = 0u64;
        for record in records.iter() {
            drained += record.cost;
            if drained >= shortfall {
                let age = now.duration_since(record.at);
                return self.window.saturating_sub(age);
            }
        }
        self.window
    }

    /// Block until `cost` units are admitted. Each pass re-evaluates the
    /// window from scratch, so concurrent consumption during the sleep
    /// just produces another wait; no pass can starve another.
    ///
    /// Sleeps the calling thread; call from a worker thread, not from an
    /// async context. There is no timeout: a cost larger than the whole
    /// limit can never be admitted, so callers must screen such tasks out
    /// up front.
    pub fn await_admission(&self, cost: u64) {
        loop {
            let wait = self.try_admit(cost);
            if wait.is_zero() {
                return;
            }
            tracing::debug!(
                cost,
                wait_ms = wait.as_millis() as u64,
                "budget window full; backing off"
            );
            std::thread::sleep(wait);
        }
    }

    /// Record `cost` units without admission. Used when the backend
    /// reports consumption the tracker could not observe (a quota
    /// rejection means the local estimate undershot reality). The window
    /// sum may exceed the limit until the pushed record ages out; that is
    /// the intended way to absorb the correction.
    pub fn push_external_cost(&self, cost: u64) {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        records.push_back(UsageRecord { cost, at: now });
    }

    /// True if any usage is recorded inside the trailing window. Display
    /// only; admission never consults this.
    pub fn active_load(&self) -> bool {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        purge_expired(&mut records, now, self.window);
        !records.is_empty()
    }

    /// Sum of recorded cost inside the trailing window.
    #[cfg(test)]
    pub(crate) fn in_window(&self) -> u64 {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap();
        purge_expired(&mut records, now, self.window);
        records.iter().map(|r| r.cost).sum()
    }
}

/// Drop records older than the window. Records are appended in time order,
/// so expired entries are always a prefix.
fn purge_expired(records: &mut VecDeque<UsageRecord>, now: Instant, window: Duration) {
    while let Some(front) = records.front() {
        if now.duration_since(front.at) >= window {
            records.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_within_limit_records_usage() {
        let budget = BudgetTracker::new(100, Duration::from_secs(60));
        assert_eq!(budget.try_admit(40), Duration::ZERO);
        assert_eq!(budget.try_admit(60), Duration::ZERO);
        assert_eq!(budget.in_window(), 100);
    }

    #[test]
    fn admit_full_window_returns_wait_without_recording() {
        let budget = BudgetTracker::new(100, Duration::from_secs(60));
        assert_eq!(budget.try_admit(80), Duration::ZERO);
        let wait = budget.try_admit(30);
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(60));
        // The rejected attempt must not have consumed anything.
        assert_eq!(budget.in_window(), 80);
    }

    #[test]
    fn large_task_waits_while_small_task_fits() {
        // Two 80s and one 10 against limit 100: first 80 and the 10 go
        // through immediately, the second 80 has to wait for the window.
        let budget = BudgetTracker::new(100, Duration::from_secs(60));
        assert_eq!(budget.try_admit(80), Duration::ZERO);
        assert!(budget.try_admit(80) > Duration::ZERO);
        assert_eq!(budget.try_admit(10), Duration::ZERO);
        assert_eq!(budget.in_window(), 90);
    }

    #[test]
    fn wait_hint_is_oldest_record_expiry() {
        let window = Duration::from_millis(400);
        let budget = BudgetTracker::new(100, window);
        assert_eq!(budget.try_admit(60), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(budget.try_admit(40), Duration::ZERO);
        // Shortfall for 50 more is 50; the oldest record (60) covers it,
        // so the hint tracks that record's remaining lifetime (~280ms),
        // not the full-window fallback of 400ms.
        let wait = budget.try_admit(50);
        assert!(wait > Duration::ZERO, "wait was {:?}", wait);
        assert!(wait < Duration::from_millis(350), "wait was {:?}", wait);
    }

    #[test]
    fn oversized_cost_falls_back_to_full_window() {
        let window = Duration::from_secs(60);
        let budget = BudgetTracker::new(100, window);
        // No drain point can ever cover a cost above the limit.
        assert_eq!(budget.try_admit(150), window);
        assert_eq!(budget.in_window(), 0);
    }

    #[test]
    fn external_cost_may_overshoot_limit() {
        let budget = BudgetTracker::new(100, Duration::from_secs(60));
        assert_eq!(budget.try_admit(80), Duration::ZERO);
        budget.push_external_cost(50);
        assert_eq!(budget.in_window(), 130);
        assert!(budget.active_load());
        // Ordinary admission still respects the (now exceeded) limit.
        assert!(budget.try_admit(10) > Duration::ZERO);
    }

    #[test]
    fn records_age_out_and_purge_is_idempotent() {
        let budget = BudgetTracker::new(100, Duration::from_millis(80));
        assert_eq!(budget.try_admit(100), Duration::ZERO);
        assert!(budget.active_load());
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(budget.in_window(), 0);
        assert_eq!(budget.in_window(), 0);
        assert!(!budget.active_load());
        assert_eq!(budget.try_admit(100), Duration::ZERO);
    }

    #[test]
    fn await_admission_blocks_until_window_drains() {
        let window = Duration::from_millis(200);
        let budget = BudgetTracker::new(100, window);
        assert_eq!(budget.try_admit(100), Duration::ZERO);
        let start = Instant::now();
        budget.await_admission(50);
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(budget.in_window(), 50);
    }
}
