pub mod locks;
pub mod service;

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

pub use locks::UserLocks;

/// Failure raised by an activity log or counter store.
#[derive(Debug, Error)]
pub enum StoreFault {
    #[error("store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// The single error a streak refresh reports to its caller. The counter is
/// untouched whenever this is returned.
#[derive(Debug, Error)]
#[error("streak evaluation unavailable for user {user_id}: {fault}")]
pub struct EvaluationUnavailable {
    pub user_id: i64,
    #[source]
    pub fault: StoreFault,
}

impl EvaluationUnavailable {
    pub fn new(user_id: i64, fault: StoreFault) -> Self {
        Self { user_id, fault }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self.fault, StoreFault::InvalidState(_))
    }
}

/// Read side of the activity history. Instants are unix seconds.
pub trait ActivityLog {
    /// Whether a completion record exists with `start <= recorded_at < end`.
    fn has_completion_in_range(&self, user_id: i64, start: i64, end: i64)
    -> Result<bool, StoreFault>;

    /// Latest completion with `recorded_at < before`.
    fn last_completion_before(&self, user_id: i64, before: i64)
    -> Result<Option<i64>, StoreFault>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub value: i64,
    /// Day on which a completion was last counted into `value`.
    pub counted_on: Option<NaiveDate>,
}

pub trait CounterStore {
    fn counter(&self, user_id: i64) -> Result<CounterSnapshot, StoreFault>;

    fn set_counter(
        &self,
        user_id: i64,
        value: u32,
        counted_on: Option<NaiveDate>,
    ) -> Result<(), StoreFault>;
}

/// Day boundaries around an evaluation instant, as unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub today: NaiveDate,
    pub yesterday_start: i64,
    pub today_start: i64,
    pub tomorrow_start: i64,
}

impl DayWindow {
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Self, StoreFault> {
        let tz = now.timezone();
        let today = now.date_naive();
        let yesterday = today
            .pred_opt()
            .ok_or_else(|| StoreFault::InvalidState(format!("no day before {today}")))?;
        let tomorrow = today
            .succ_opt()
            .ok_or_else(|| StoreFault::InvalidState(format!("no day after {today}")))?;

        Ok(Self {
            today,
            yesterday_start: start_of_day(&tz, yesterday)?,
            today_start: start_of_day(&tz, today)?,
            tomorrow_start: start_of_day(&tz, tomorrow)?,
        })
    }
}

/// First valid instant of `day` in `tz`. Midnight can fall inside a DST gap,
/// in which case the first hour that exists is used.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Result<i64, StoreFault> {
    let midnight = day.and_hms_opt(0, 0, 0).ok_or_else(|| {
        StoreFault::InvalidState(format!("cannot build midnight for {day}"))
    })?;

    (0..3)
        .find_map(|hour| {
            tz.from_local_datetime(&(midnight + Duration::hours(hour)))
                .earliest()
        })
        .map(|start| start.timestamp())
        .ok_or_else(|| StoreFault::InvalidState(format!("no local start of day for {day}")))
}

/// Decide the new streak value.
///
/// `last_completion_before_today` is compared by calendar day in the timezone
/// of `now`:
///
/// | completed today | last completion    | result              |
/// |-----------------|--------------------|---------------------|
/// | yes             | none               | 1                   |
/// | yes             | yesterday          | `current + 1`       |
/// | yes             | before yesterday   | 1                   |
/// | yes             | today (duplicate)  | `current`           |
/// | no              | none               | 0                   |
/// | no              | yesterday          | `current` (grace)   |
/// | no              | before yesterday   | 0                   |
pub fn evaluate<Tz: TimeZone>(
    current_streak: u32,
    completed_today: bool,
    last_completion_before_today: Option<&DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> u32 {
    let today = now.date_naive();
    let last_day = last_completion_before_today
        .map(|timestamp| timestamp.with_timezone(&now.timezone()).date_naive());

    // Without a day before today nothing can be "yesterday".
    let position = match (last_day, today.pred_opt()) {
        (Some(day), Some(yesterday)) => Some(day.cmp(&yesterday)),
        (Some(_), None) => Some(Ordering::Greater),
        (None, _) => None,
    };

    match (completed_today, position) {
        (true, None) => 1,
        (true, Some(Ordering::Equal)) => current_streak.saturating_add(1),
        (true, Some(Ordering::Less)) => 1,
        (true, Some(Ordering::Greater)) => current_streak,
        (false, None) => 0,
        (false, Some(Ordering::Equal)) => current_streak,
        (false, Some(Ordering::Less)) => 0,
        (false, Some(Ordering::Greater)) => current_streak,
    }
}

/// Read both activity facts and the counter, evaluate, and write the result.
///
/// The write always happens once the reads succeed, even if the value is
/// unchanged. A completion that was already counted today is not counted
/// again, so repeated triggers on the same day leave the counter alone.
pub fn refresh_streak<L, S, Tz>(
    log: &L,
    store: &S,
    user_id: i64,
    now: &DateTime<Tz>,
) -> Result<u32, EvaluationUnavailable>
where
    L: ActivityLog + ?Sized,
    S: CounterStore + ?Sized,
    Tz: TimeZone,
{
    let fail = |fault| EvaluationUnavailable::new(user_id, fault);

    let window = DayWindow::containing(now).map_err(fail)?;
    let completed_today = log
        .has_completion_in_range(user_id, window.today_start, window.tomorrow_start)
        .map_err(fail)?;
    let last_before = log
        .last_completion_before(user_id, window.today_start)
        .map_err(fail)?;

    if let Some(timestamp) = last_before {
        if timestamp >= window.today_start {
            return Err(fail(StoreFault::InvalidState(format!(
                "completion at {timestamp} reported as before day start {}",
                window.today_start
            ))));
        }
    }

    let snapshot = store.counter(user_id).map_err(fail)?;
    let current = u32::try_from(snapshot.value).map_err(|_| {
        fail(StoreFault::InvalidState(format!(
            "stored streak {} is out of range",
            snapshot.value
        )))
    })?;

    let last_completion = last_before
        .map(|timestamp| {
            now.timezone()
                .timestamp_opt(timestamp, 0)
                .single()
                .ok_or_else(|| {
                    StoreFault::InvalidState(format!("completion timestamp {timestamp} is invalid"))
                })
        })
        .transpose()
        .map_err(fail)?;

    let already_counted = completed_today && snapshot.counted_on == Some(window.today);
    let next = if already_counted {
        current
    } else {
        evaluate(current, completed_today, last_completion.as_ref(), now)
    };
    let counted_on = if completed_today {
        Some(window.today)
    } else {
        snapshot.counted_on
    };

    store
        .set_counter(user_id, next, counted_on)
        .map_err(fail)?;

    debug!(
        user_id,
        previous = current,
        streak = next,
        completed_today,
        already_counted,
        "streak evaluated"
    );

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::FixedOffset;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn zone() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).expect("offset")
    }

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        zone()
            .with_ymd_and_hms(2026, 3, day, hour, 0, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn first_completion_today_starts_at_one() {
        let now = at(10, 9);
        assert_eq!(evaluate(0, true, None, &now), 1);
        assert_eq!(evaluate(17, true, None, &now), 1);
    }

    #[test]
    fn no_history_and_no_completion_is_zero() {
        let now = at(10, 9);
        for current in [0, 1, 42] {
            assert_eq!(evaluate(current, false, None, &now), 0);
        }
    }

    #[test]
    fn completion_after_yesterday_increments() {
        let yesterday = at(9, 21);
        assert_eq!(evaluate(5, true, Some(&yesterday), &at(10, 8)), 6);
    }

    #[test]
    fn gap_of_two_days_resets() {
        let three_days_ago = at(7, 12);
        assert_eq!(evaluate(5, false, Some(&three_days_ago), &at(10, 12)), 0);
        assert_eq!(evaluate(5, true, Some(&three_days_ago), &at(10, 12)), 1);
    }

    #[test]
    fn grace_day_keeps_streak() {
        let yesterday = at(9, 7);
        assert_eq!(evaluate(5, false, Some(&yesterday), &at(10, 23)), 5);
    }

    #[test]
    fn same_day_duplicate_does_not_increment() {
        let now = at(10, 18);
        let first = evaluate(3, true, Some(&at(9, 10)), &now);
        let second = evaluate(first, true, Some(&at(10, 8)), &now);
        assert_eq!(first, 4);
        assert_eq!(second, first);
    }

    #[test]
    fn days_are_compared_in_the_clock_timezone() {
        // 23:30 UTC on the 9th is 01:30 on the 10th at +02:00.
        let late_utc = chrono::Utc
            .with_ymd_and_hms(2026, 3, 9, 23, 30, 0)
            .single()
            .expect("valid instant")
            .with_timezone(&zone());
        assert_eq!(evaluate(4, true, Some(&late_utc), &at(11, 9)), 5);
    }

    #[test]
    fn streak_only_moves_by_increment_or_reset() {
        let now = at(10, 12);
        let candidates = [None, Some(at(9, 1)), Some(at(10, 1)), Some(at(2, 1))];
        for current in [0_u32, 1, 2, 9, u32::MAX] {
            for completed in [true, false] {
                for last in &candidates {
                    let next = evaluate(current, completed, last.as_ref(), &now);
                    let allowed = next == 0
                        || next == 1
                        || next == current
                        || next == current.saturating_add(1);
                    assert!(allowed, "{current} -> {next}");
                }
            }
        }
    }

    #[test]
    fn day_window_is_contiguous() {
        let window = DayWindow::containing(&at(10, 15)).expect("window");
        assert_eq!(window.today, NaiveDate::from_ymd_opt(2026, 3, 10).expect("date"));
        assert_eq!(window.today_start, at(10, 0).timestamp());
        assert_eq!(window.today_start - window.yesterday_start, 86_400);
        assert_eq!(window.tomorrow_start - window.today_start, 86_400);
    }

    #[test]
    fn midnight_inside_a_dst_gap_starts_at_the_first_valid_hour() {
        use chrono::Timelike;
        use chrono_tz::America::Santiago;

        // Clocks jump from 00:00 to 01:00 on this day.
        let now = Santiago
            .with_ymd_and_hms(2026, 9, 6, 12, 0, 0)
            .single()
            .expect("valid instant");
        let window = DayWindow::containing(&now).expect("window");
        let start = Santiago
            .timestamp_opt(window.today_start, 0)
            .single()
            .expect("start");

        assert_eq!(start.hour(), 1);
        assert_eq!(window.today_start, 1_788_667_200);
        assert_eq!(window.today_start - window.yesterday_start, 86_400);
        assert_eq!(window.tomorrow_start - window.today_start, 82_800);

        let late_yesterday = Santiago
            .with_ymd_and_hms(2026, 9, 5, 23, 30, 0)
            .single()
            .expect("valid instant");
        assert_eq!(evaluate(2, true, Some(&late_yesterday), &now), 3);
    }

    #[test]
    fn day_length_follows_dst_transitions() {
        use chrono_tz::Europe::Amsterdam;

        let spring = Amsterdam
            .with_ymd_and_hms(2026, 3, 29, 12, 0, 0)
            .single()
            .expect("valid instant");
        let window = DayWindow::containing(&spring).expect("window");
        assert_eq!(window.today_start, 1_774_738_800);
        assert_eq!(window.tomorrow_start - window.today_start, 82_800);

        let autumn = Amsterdam
            .with_ymd_and_hms(2026, 10, 25, 12, 0, 0)
            .single()
            .expect("valid instant");
        let window = DayWindow::containing(&autumn).expect("window");
        assert_eq!(window.tomorrow_start - window.today_start, 90_000);
    }

    #[derive(Default)]
    struct FakeLog {
        completions: HashMap<i64, Vec<i64>>,
        unavailable: bool,
        leak_today: bool,
    }

    impl FakeLog {
        fn with(user_id: i64, timestamps: &[DateTime<FixedOffset>]) -> Self {
            Self {
                completions: HashMap::from([(
                    user_id,
                    timestamps.iter().map(DateTime::timestamp).collect(),
                )]),
                ..Self::default()
            }
        }
    }

    impl ActivityLog for FakeLog {
        fn has_completion_in_range(
            &self,
            user_id: i64,
            start: i64,
            end: i64,
        ) -> Result<bool, StoreFault> {
            if self.unavailable {
                return Err(StoreFault::StoreUnavailable(anyhow!("log offline")));
            }
            Ok(self
                .completions
                .get(&user_id)
                .is_some_and(|all| all.iter().any(|ts| *ts >= start && *ts < end)))
        }

        fn last_completion_before(
            &self,
            user_id: i64,
            before: i64,
        ) -> Result<Option<i64>, StoreFault> {
            if self.unavailable {
                return Err(StoreFault::StoreUnavailable(anyhow!("log offline")));
            }
            let all = self.completions.get(&user_id);
            Ok(all.and_then(|all| {
                all.iter()
                    .copied()
                    .filter(|ts| self.leak_today || *ts < before)
                    .max()
            }))
        }
    }

    #[derive(Default)]
    struct FakeCounters {
        values: Mutex<HashMap<i64, CounterSnapshot>>,
        writes: Mutex<usize>,
        fail_writes: bool,
    }

    impl FakeCounters {
        fn seeded(user_id: i64, value: i64) -> Self {
            let counters = Self::default();
            counters.values.lock().expect("lock").insert(
                user_id,
                CounterSnapshot {
                    value,
                    counted_on: None,
                },
            );
            counters
        }

        fn value(&self, user_id: i64) -> i64 {
            self.values
                .lock()
                .expect("lock")
                .get(&user_id)
                .map_or(0, |snapshot| snapshot.value)
        }

        fn writes(&self) -> usize {
            *self.writes.lock().expect("lock")
        }
    }

    impl CounterStore for FakeCounters {
        fn counter(&self, user_id: i64) -> Result<CounterSnapshot, StoreFault> {
            Ok(self
                .values
                .lock()
                .expect("lock")
                .get(&user_id)
                .copied()
                .unwrap_or(CounterSnapshot {
                    value: 0,
                    counted_on: None,
                }))
        }

        fn set_counter(
            &self,
            user_id: i64,
            value: u32,
            counted_on: Option<NaiveDate>,
        ) -> Result<(), StoreFault> {
            if self.fail_writes {
                return Err(StoreFault::StoreUnavailable(anyhow!("counter offline")));
            }
            *self.writes.lock().expect("lock") += 1;
            self.values.lock().expect("lock").insert(
                user_id,
                CounterSnapshot {
                    value: i64::from(value),
                    counted_on,
                },
            );
            Ok(())
        }
    }

    #[test]
    fn refresh_increments_after_yesterday() {
        let log = FakeLog::with(1, &[at(9, 20), at(10, 7)]);
        let counters = FakeCounters::seeded(1, 5);

        let streak = refresh_streak(&log, &counters, 1, &at(10, 12)).expect("refresh");

        assert_eq!(streak, 6);
        assert_eq!(counters.value(1), 6);
    }

    #[test]
    fn refresh_twice_on_the_same_day_counts_once() {
        let log = FakeLog::with(1, &[at(9, 20), at(10, 7), at(10, 11)]);
        let counters = FakeCounters::seeded(1, 5);

        let first = refresh_streak(&log, &counters, 1, &at(10, 12)).expect("first");
        let second = refresh_streak(&log, &counters, 1, &at(10, 19)).expect("second");

        assert_eq!(first, 6);
        assert_eq!(second, 6);
        assert_eq!(counters.writes(), 2);
    }

    #[test]
    fn refresh_writes_even_when_unchanged() {
        let log = FakeLog::with(1, &[at(9, 20)]);
        let counters = FakeCounters::seeded(1, 5);

        let streak = refresh_streak(&log, &counters, 1, &at(10, 12)).expect("refresh");

        assert_eq!(streak, 5);
        assert_eq!(counters.writes(), 1);
    }

    #[test]
    fn refresh_resets_after_missed_days() {
        let log = FakeLog::with(1, &[at(7, 20)]);
        let counters = FakeCounters::seeded(1, 5);

        assert_eq!(refresh_streak(&log, &counters, 1, &at(10, 12)).expect("refresh"), 0);
    }

    #[test]
    fn refresh_first_ever_activity_is_one() {
        let log = FakeLog::with(1, &[at(10, 6)]);
        let counters = FakeCounters::default();

        assert_eq!(refresh_streak(&log, &counters, 1, &at(10, 12)).expect("refresh"), 1);
    }

    #[test]
    fn refresh_rejects_same_day_leak_from_log() {
        let mut log = FakeLog::with(1, &[at(9, 20), at(10, 7)]);
        log.leak_today = true;
        let counters = FakeCounters::seeded(1, 3);

        let error = refresh_streak(&log, &counters, 1, &at(10, 12)).expect_err("leak rejected");

        assert!(error.is_invalid_state());
        assert_eq!(counters.value(1), 3);
        assert_eq!(counters.writes(), 0);
    }

    #[test]
    fn refresh_rejects_negative_counter() {
        let log = FakeLog::with(1, &[at(10, 7)]);
        let counters = FakeCounters::seeded(1, -2);

        let error = refresh_streak(&log, &counters, 1, &at(10, 12)).expect_err("negative");

        assert!(error.is_invalid_state());
        assert_eq!(counters.value(1), -2);
    }

    #[test]
    fn refresh_leaves_counter_when_log_is_unavailable() {
        let mut log = FakeLog::with(1, &[at(9, 7)]);
        log.unavailable = true;
        let counters = FakeCounters::seeded(1, 4);

        let error = refresh_streak(&log, &counters, 1, &at(10, 12)).expect_err("unavailable");

        assert!(!error.is_invalid_state());
        assert_eq!(error.user_id, 1);
        assert_eq!(counters.value(1), 4);
        assert_eq!(counters.writes(), 0);
    }

    #[test]
    fn refresh_reports_failed_write() {
        let log = FakeLog::with(1, &[at(10, 7)]);
        let counters = FakeCounters {
            fail_writes: true,
            ..FakeCounters::default()
        };

        let error = refresh_streak(&log, &counters, 1, &at(10, 12)).expect_err("write fails");

        assert!(matches!(error.fault, StoreFault::StoreUnavailable(_)));
    }
}
