use std::time::Duration;

use tokio::time::Instant;

/// One-shot deadline. Fires once `interval` has elapsed since it was armed and
/// keeps firing until the owner replaces it with a freshly armed timer.
///
/// A timer armed with no interval (or a zero one) is empty and never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartTimer {
    deadline: Option<Instant>,
}

impl RestartTimer {
    pub fn arm(now: Instant, interval: Option<Duration>) -> Self {
        let deadline = interval
            .and_then(|interval| now.checked_add(interval))
            .filter(|deadline| *deadline > now);
        Self { deadline }
    }

    pub fn disabled() -> Self {
        Self { deadline: None }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn fired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => now > deadline,
            None => false,
        }
    }
}

/// Converts the configured restart seconds into an interval. Zero and negative
/// values disable scheduled restarts.
pub fn restart_interval(seconds: i64) -> Option<Duration> {
    u64::try_from(seconds)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{restart_interval, RestartTimer};

    #[test]
    fn non_positive_intervals_never_fire() {
        let start = Instant::now();
        for seconds in [0, -1, -3600] {
            let timer = RestartTimer::arm(start, restart_interval(seconds));
            assert_eq!(timer.deadline(), None, "{seconds}s should produce an empty timer");
            for offset in [0, 1, 60, 86_400 * 365] {
                assert!(!timer.fired(start + Duration::from_secs(offset)));
            }
        }
    }

    #[test]
    fn zero_duration_is_treated_as_disabled() {
        let start = Instant::now();
        let timer = RestartTimer::arm(start, Some(Duration::ZERO));
        assert_eq!(timer.deadline(), None);
        assert!(!timer.fired(start + Duration::from_secs(10)));
    }

    #[test]
    fn fires_only_strictly_after_deadline() {
        let start = Instant::now();
        let timer = RestartTimer::arm(start, restart_interval(5));

        assert!(!timer.fired(start));
        assert!(!timer.fired(start + Duration::from_millis(4_999)));
        assert!(!timer.fired(start + Duration::from_secs(5)));
        assert!(timer.fired(start + Duration::from_millis(5_001)));
    }

    #[test]
    fn stays_fired_for_later_queries() {
        let start = Instant::now();
        let timer = RestartTimer::arm(start, restart_interval(2));

        let first = start + Duration::from_secs(3);
        assert!(timer.fired(first));
        assert!(timer.fired(first));
        assert!(timer.fired(start + Duration::from_secs(7_200)));
    }

    #[test]
    fn rearming_moves_the_deadline_forward() {
        let start = Instant::now();
        let timer = RestartTimer::arm(start, restart_interval(5));
        let later = start + Duration::from_secs(6);
        assert!(timer.fired(later));

        let rearmed = RestartTimer::arm(later, restart_interval(5));
        assert!(!rearmed.fired(later + Duration::from_secs(1)));
        assert_eq!(rearmed.deadline(), Some(later + Duration::from_secs(5)));
    }

    #[test]
    fn restart_interval_maps_seconds() {
        assert_eq!(restart_interval(90), Some(Duration::from_secs(90)));
        assert_eq!(restart_interval(0), None);
        assert_eq!(restart_interval(-5), None);
        assert_eq!(RestartTimer::disabled().deadline(), None);
    }
}
