//! Periodic reconnect alarm.
//!
//! The alarm is a tokio task that calls a callback once per period. The first
//! call happens one full period after arming. Re-arming replaces the running
//! task; dropping the alarm clears it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Name used in logs for the reconnect alarm.
pub const RECONNECT_ALARM: &str = "auto_reload_proxy";

/// Shortest period the alarm accepts.
const MIN_PERIOD: Duration = Duration::from_secs(1);

const MINUTES_IN_HOUR: u32 = 60;
const MINUTES_IN_DAY: u32 = 24 * MINUTES_IN_HOUR;
const MINUTES_IN_MONTH: u32 = 30 * MINUTES_IN_DAY;
const MINUTES_IN_YEAR: u32 = 12 * MINUTES_IN_MONTH;

/// A cancellable periodic timer.
#[derive(Debug, Default)]
pub struct ReconnectAlarm {
    task: Option<JoinHandle<()>>,
    period: Option<Duration>,
}

impl ReconnectAlarm {
    /// Creates a cleared alarm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while the timer task is running.
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// The period of the running timer.
    pub fn period(&self) -> Option<Duration> {
        if self.is_armed() {
            self.period
        } else {
            None
        }
    }

    /// Starts (or restarts) the timer.
    ///
    /// `on_fire` returns `false` to stop the timer, e.g. when its receiver is gone.
    pub fn arm<F, Fut>(&mut self, period: Duration, on_fire: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.clear();
        let period = period.max(MIN_PERIOD);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                debug!(alarm = RECONNECT_ALARM, "Alarm fired");
                if !on_fire().await {
                    debug!(alarm = RECONNECT_ALARM, "Alarm receiver gone, stopping");
                    break;
                }
            }
        });

        self.task = Some(task);
        self.period = Some(period);
    }

    /// Stops the timer. Returns true if it was running.
    pub fn clear(&mut self) -> bool {
        self.period = None;
        match self.task.take() {
            Some(task) => {
                let was_running = !task.is_finished();
                task.abort();
                was_running
            }
            None => false,
        }
    }
}

impl Drop for ReconnectAlarm {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Formats a minute count as "1 year 2 months 3 days 4 hours 5 minutes".
///
/// Months are 30 days and years 12 months. Zero parts are omitted, except
/// that a zero total reads "0 minutes".
pub fn format_interval(minutes: u32) -> String {
    let years = minutes / MINUTES_IN_YEAR;
    let months = (minutes % MINUTES_IN_YEAR) / MINUTES_IN_MONTH;
    let days = (minutes % MINUTES_IN_MONTH) / MINUTES_IN_DAY;
    let hours = (minutes % MINUTES_IN_DAY) / MINUTES_IN_HOUR;
    let mins = minutes % MINUTES_IN_HOUR;

    let mut parts = Vec::new();
    for (value, unit) in [
        (years, "year"),
        (months, "month"),
        (days, "day"),
        (hours, "hour"),
    ] {
        if value > 0 {
            parts.push(plural(value, unit));
        }
    }
    if mins > 0 || parts.is_empty() {
        parts.push(plural(mins, "minute"));
    }

    parts.join(" ")
}

fn plural(value: u32, unit: &str) -> String {
    if value == 1 {
        format!("{} {}", value, unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0), "0 minutes");
        assert_eq!(format_interval(1), "1 minute");
        assert_eq!(format_interval(5), "5 minutes");
        assert_eq!(format_interval(60), "1 hour");
        assert_eq!(format_interval(120), "2 hours");
        assert_eq!(format_interval(125), "2 hours 5 minutes");
        assert_eq!(format_interval(MINUTES_IN_DAY + 1), "1 day 1 minute");
        assert_eq!(format_interval(MINUTES_IN_MONTH), "1 month");
        assert_eq!(
            format_interval(MINUTES_IN_YEAR + 2 * MINUTES_IN_MONTH + 3 * MINUTES_IN_DAY + 4 * 60 + 5),
            "1 year 2 months 3 days 4 hours 5 minutes"
        );
    }

    fn counting_alarm(alarm: &mut ReconnectAlarm, period: Duration) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        alarm.arm(period, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_fires_each_period() {
        let mut alarm = ReconnectAlarm::new();
        let count = counting_alarm(&mut alarm, Duration::from_secs(60));

        assert!(alarm.is_armed());
        assert_eq!(alarm.period(), Some(Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_stops_alarm() {
        let mut alarm = ReconnectAlarm::new();
        let count = counting_alarm(&mut alarm, Duration::from_secs(10));

        assert!(alarm.clear());
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!alarm.is_armed());
        assert!(alarm.period().is_none());
        assert!(!alarm.clear());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_timer() {
        let mut alarm = ReconnectAlarm::new();
        let first = counting_alarm(&mut alarm, Duration::from_secs(10));
        let second = counting_alarm(&mut alarm, Duration::from_secs(50));

        tokio::time::sleep(Duration::from_secs(55)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(alarm.period(), Some(Duration::from_secs(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_stop_alarm() {
        let mut alarm = ReconnectAlarm::new();
        alarm.arm(Duration::from_secs(5), || async { false });

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(!alarm.is_armed());
    }
}
