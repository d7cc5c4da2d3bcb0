use chrono::NaiveDate;
use progress_core::Clock;
use storage::keys::{CURRENT_STREAK_KEY, LAST_ACCESS_DATE_KEY};
use storage::repository::StorageError;
use tracing::warn;

use crate::ledger_store::LocalLedgerStore;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Daily-access streak kept next to the progress ledgers.
#[derive(Clone)]
pub struct StreakTracker {
    clock: Clock,
    local: LocalLedgerStore,
}

impl StreakTracker {
    #[must_use]
    pub fn new(clock: Clock, local: LocalLedgerStore) -> Self {
        Self { clock, local }
    }

    /// Register an access today and return the current streak.
    ///
    /// Storage failures are logged and count as a fresh start.
    pub async fn touch(&self) -> u32 {
        let today = self.clock.today();
        match self.update(today).await {
            Ok(streak) => streak,
            Err(err) => {
                warn!(error = %err, "streak update failed");
                1
            }
        }
    }

    /// Streak as last stored, without registering an access.
    pub async fn current(&self) -> u32 {
        match self.local.cache().get(CURRENT_STREAK_KEY).await {
            Ok(raw) => raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0),
            Err(err) => {
                warn!(error = %err, "streak read failed");
                0
            }
        }
    }

    async fn update(&self, today: NaiveDate) -> Result<u32, StorageError> {
        let cache = self.local.cache();
        let last = cache
            .get(LAST_ACCESS_DATE_KEY)
            .await?
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok());
        let stored: Option<u32> = cache
            .get(CURRENT_STREAK_KEY)
            .await?
            .and_then(|raw| raw.trim().parse().ok());

        let streak = next_streak(last, stored, today);
        if last != Some(today) || stored != Some(streak) {
            cache
                .put(LAST_ACCESS_DATE_KEY, &today.format(DATE_FORMAT).to_string())
                .await?;
            cache.put(CURRENT_STREAK_KEY, &streak.to_string()).await?;
        }
        Ok(streak)
    }
}

fn next_streak(last: Option<NaiveDate>, stored: Option<u32>, today: NaiveDate) -> u32 {
    let Some(last) = last else {
        return 1;
    };
    let stored = stored.filter(|n| *n > 0).unwrap_or(1);
    if last == today {
        stored
    } else if last.succ_opt() == Some(today) {
        stored.saturating_add(1)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::time::fixed_now;
    use std::sync::Arc;
    use storage::repository::{InMemoryRepository, LocalCache};

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap()
    }

    #[test]
    fn streak_rules() {
        let today = day("2024-03-10");
        assert_eq!(next_streak(None, None, today), 1);
        assert_eq!(next_streak(Some(today), Some(4), today), 4);
        assert_eq!(next_streak(Some(day("2024-03-09")), Some(4), today), 5);
        assert_eq!(next_streak(Some(day("2024-03-07")), Some(4), today), 1);
        assert_eq!(next_streak(Some(day("2024-03-09")), None, today), 2);
        assert_eq!(next_streak(Some(day("2024-03-11")), Some(4), today), 1);
    }

    #[tokio::test]
    async fn consecutive_days_extend_the_streak() {
        let repo = InMemoryRepository::new();
        let local = LocalLedgerStore::new(Arc::new(repo.clone()));
        let mut clock = Clock::fixed(fixed_now());

        assert_eq!(StreakTracker::new(clock, local.clone()).touch().await, 1);
        assert_eq!(StreakTracker::new(clock, local.clone()).touch().await, 1);
        clock.advance(Duration::days(1));
        assert_eq!(StreakTracker::new(clock, local.clone()).touch().await, 2);
        clock.advance(Duration::days(3));
        let tracker = StreakTracker::new(clock, local);
        assert_eq!(tracker.touch().await, 1);
        assert_eq!(tracker.current().await, 1);
        assert_eq!(
            repo.get(LAST_ACCESS_DATE_KEY).await.unwrap().as_deref(),
            Some("2023-11-18")
        );
    }

    #[tokio::test]
    async fn malformed_values_restart() {
        let repo = InMemoryRepository::new();
        repo.put(LAST_ACCESS_DATE_KEY, "yesterday").await.unwrap();
        repo.put(CURRENT_STREAK_KEY, "many").await.unwrap();
        let tracker = StreakTracker::new(Clock::fixed(fixed_now()), LocalLedgerStore::new(Arc::new(repo)));
        assert_eq!(tracker.touch().await, 1);
    }
}
