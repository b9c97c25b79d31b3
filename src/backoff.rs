use embassy_time::{Duration, Instant};

/// A failure class is reported upstream once it has persisted this long.
pub const FAILURE_REPORT_THRESHOLD: Duration = Duration::from_secs(10 * 60);

pub const REGISTRATION_BACKOFF_START: Duration = Duration::from_secs(60);
pub const DATA_SESSION_BACKOFF_START: Duration = Duration::from_secs(60);
pub const DATA_SESSION_BACKOFF_MAX: Duration = Duration::from_secs(30 * 60);

/// Waits after consecutive bad HTTP status codes. The last entry repeats.
pub const HTTP_BACKOFF_TABLE: [Duration; 7] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(240),
    Duration::from_secs(480),
    Duration::from_secs(960),
    Duration::from_secs(1800),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Doubling { start: Duration, max: Duration },
    Table(&'static [Duration]),
}

/// Retry gate of one failure class (registration, data session or HTTP).
#[derive(Debug, Clone)]
pub struct Backoff {
    schedule: Schedule,
    failures: u8,
    timeout: Duration,
    until: Option<Instant>,
    first_failure: Option<Instant>,
    reported: bool,
}

impl Backoff {
    pub const fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            failures: 0,
            timeout: Duration::from_ticks(0),
            until: None,
            first_failure: None,
            reported: false,
        }
    }

    /// Change the cap of a doubling schedule, e.g. from a new policy.
    pub fn set_max(&mut self, new_max: Duration) {
        if let Schedule::Doubling { max, .. } = &mut self.schedule {
            *max = new_max;
        }
    }

    /// Record a failure at `now` and start the next wait.
    ///
    /// Returns `true` exactly once per failure streak: the first time the
    /// streak has lasted longer than [`FAILURE_REPORT_THRESHOLD`].
    pub fn fail(&mut self, now: Instant) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.timeout = match self.schedule {
            Schedule::Doubling { start, max } if self.failures == 1 => start.min(max),
            Schedule::Doubling { max, .. } => (self.timeout * 2).min(max),
            Schedule::Table(table) => {
                let idx = (self.failures as usize - 1).min(table.len().saturating_sub(1));
                table.get(idx).copied().unwrap_or(Duration::from_ticks(0))
            }
        };
        self.until = Some(now + self.timeout);

        let first = *self.first_failure.get_or_insert(now);
        if !self.reported && now.saturating_duration_since(first) >= FAILURE_REPORT_THRESHOLD {
            self.reported = true;
            return true;
        }
        false
    }

    pub fn succeed(&mut self) {
        self.failures = 0;
        self.timeout = Duration::from_ticks(0);
        self.until = None;
        self.first_failure = None;
        self.reported = false;
    }

    /// Whether a new attempt is still suppressed at `now`.
    pub fn is_running(&self, now: Instant) -> bool {
        self.until.map_or(false, |until| now < until)
    }

    pub fn next_try_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn failures(&self) -> u8 {
        self.failures
    }

    /// `true` while the class has not failed since its last success
    pub fn healthy(&self) -> bool {
        self.failures == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    fn doubling_escalates_then_plateaus() {
        let mut backoff = Backoff::new(Schedule::Doubling {
            start: Duration::from_secs(60),
            max: Duration::from_secs(300),
        });

        let mut timeouts = [Duration::from_ticks(0); 5];
        for (i, t) in timeouts.iter_mut().enumerate() {
            backoff.fail(at(i as u64));
            *t = backoff.next_try_timeout();
        }
        assert_eq!(
            timeouts.map(|d| d.as_secs()),
            [60, 120, 240, 300, 300]
        );
        assert!(backoff.is_running(at(4)));
        assert!(!backoff.is_running(at(4 + 300)));

        backoff.succeed();
        assert!(backoff.healthy());
        assert!(!backoff.is_running(at(5)));
        assert_eq!(backoff.next_try_timeout(), Duration::from_ticks(0));
    }

    #[test]
    fn table_caps_at_last_entry() {
        let mut backoff = Backoff::new(Schedule::Table(&HTTP_BACKOFF_TABLE));
        for _ in 0..10 {
            backoff.fail(at(0));
        }
        assert_eq!(backoff.next_try_timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn reports_once_after_threshold() {
        let mut backoff = Backoff::new(Schedule::Doubling {
            start: Duration::from_secs(60),
            max: Duration::from_secs(3600),
        });
        assert!(!backoff.fail(at(100)));
        assert!(!backoff.fail(at(100 + 9 * 60)));
        assert!(backoff.fail(at(100 + 10 * 60)));
        assert!(!backoff.fail(at(100 + 20 * 60)));

        backoff.succeed();
        assert!(!backoff.fail(at(5000)));
    }

    #[test]
    fn new_cap_applies_to_next_failure() {
        let mut backoff = Backoff::new(Schedule::Doubling {
            start: Duration::from_secs(60),
            max: Duration::from_secs(3600),
        });
        backoff.fail(at(0));
        backoff.fail(at(0));
        backoff.set_max(Duration::from_secs(90));
        backoff.fail(at(0));
        assert_eq!(backoff.next_try_timeout(), Duration::from_secs(90));
    }
}
