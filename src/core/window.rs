use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

/// Activity window of `days` full 24h periods ending at `now`.
///
/// The contacts search only filters reliably at day granularity, so the feed
/// is queried from `query_start` (UTC midnight of the day before the cutoff)
/// and results are narrowed with [`RecencyWindow::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    pub days: u32,
    pub now: DateTime<Utc>,
    pub cutoff: DateTime<Utc>,
    pub query_start: DateTime<Utc>,
}

impl RecencyWindow {
    pub fn ending_at(now: DateTime<Utc>, days: u32) -> Self {
        let cutoff = now - TimeDelta::days(i64::from(days));
        let cutoff_day_start = cutoff.date_naive().and_time(NaiveTime::MIN).and_utc();
        let query_start = cutoff_day_start - TimeDelta::days(1);

        Self {
            days,
            now,
            cutoff,
            query_start,
        }
    }

    /// `last_seen_at` is unix seconds.
    pub fn contains(&self, last_seen_at: i64) -> bool {
        last_seen_at > self.cutoff.timestamp()
    }
}
