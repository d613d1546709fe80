// 📊 Run Summary - per-source counters
//
// articles: every article element / complete data row seen
// ignored:  excluded by a category list
// failed:   dropped for a per-record reason (missing price, bad number, ...)
// records:  PricedRecords emitted (a repair row adds a second one)

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    started: Option<DateTime<Utc>>,
    stopped: Option<DateTime<Utc>>,
    pub articles: usize,
    pub ignored: usize,
    pub failed: usize,
    pub records: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a summary that is already running
    pub fn started() -> Self {
        let mut summary = Self::new();
        summary.start();
        summary
    }

    pub fn start(&mut self) {
        self.started = Some(Utc::now());
        self.stopped = None;
    }

    /// Freeze the summary; the counters must not move afterwards
    pub fn stop(&mut self) {
        if self.stopped.is_none() {
            self.stopped = Some(Utc::now());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn count_article(&mut self) {
        debug_assert!(!self.is_stopped(), "summary already stopped");
        self.articles += 1;
    }

    pub fn count_ignored(&mut self) {
        debug_assert!(!self.is_stopped(), "summary already stopped");
        self.ignored += 1;
    }

    pub fn count_failed(&mut self) {
        debug_assert!(!self.is_stopped(), "summary already stopped");
        self.failed += 1;
    }

    pub fn count_record(&mut self) {
        debug_assert!(!self.is_stopped(), "summary already stopped");
        self.records += 1;
    }

    /// Elapsed time; still ticking while not stopped, zero if never started
    pub fn duration(&self) -> Duration {
        match (self.started, self.stopped) {
            (None, _) => Duration::zero(),
            (Some(start), None) => Utc::now() - start,
            (Some(start), Some(stop)) => stop - start,
        }
    }

    /// Add the counters of another summary (timestamps are left alone)
    pub fn merge(&mut self, other: &RunSummary) {
        self.articles += other.articles;
        self.ignored += other.ignored;
        self.failed += other.failed;
        self.records += other.records;
    }
}

impl AddAssign<&RunSummary> for RunSummary {
    fn add_assign(&mut self, other: &RunSummary) {
        self.merge(other);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.duration();
        write!(
            f,
            "processed {} articles in {}.{:03}s (ignored: {}, failed: {}, records: {})",
            self.articles,
            elapsed.num_seconds(),
            elapsed.num_milliseconds().rem_euclid(1000),
            self.ignored,
            self.failed,
            self.records
        )
    }
}
