use super::Database;
use crate::streak::{ActivityLog, CounterSnapshot, CounterStore, StoreFault};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Activity rows whose text starts with a completion marker.
pub struct CompletionLog<'a> {
    database: &'a Database,
    marker: &'a str,
}

impl<'a> CompletionLog<'a> {
    pub fn new(database: &'a Database, marker: &'a str) -> Self {
        Self { database, marker }
    }
}

impl ActivityLog for CompletionLog<'_> {
    fn has_completion_in_range(
        &self,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<bool, StoreFault> {
        self.database
            .conn
            .query_row(
                "SELECT EXISTS (
                   SELECT 1 FROM activities
                   WHERE user_id = ?1
                     AND recorded_at >= ?2
                     AND recorded_at < ?3
                     AND substr(activity_text, 1, length(?4)) = ?4
                 )",
                params![user_id, start, end, self.marker],
                |row| row.get::<_, bool>(0),
            )
            .map_err(classify)
    }

    fn last_completion_before(
        &self,
        user_id: i64,
        before: i64,
    ) -> Result<Option<i64>, StoreFault> {
        self.database
            .conn
            .query_row(
                "SELECT MAX(recorded_at) FROM activities
                 WHERE user_id = ?1
                   AND recorded_at < ?2
                   AND substr(activity_text, 1, length(?3)) = ?3",
                params![user_id, before, self.marker],
                |row| row.get::<_, Option<i64>>(0),
            )
            .map_err(classify)
    }
}

impl Database {
    /// Run `task` inside `BEGIN IMMEDIATE`, so no other connection can write
    /// between its reads and its write. Commits when `task` succeeds and rolls
    /// back otherwise. The outer error covers taking the lock and committing.
    pub fn with_write_lock<T, E>(
        &self,
        task: impl FnOnce(&Self) -> Result<T, E>,
    ) -> Result<Result<T, E>, StoreFault> {
        let transaction = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(classify)?;

        match task(self) {
            Ok(value) => {
                transaction.commit().map_err(classify)?;
                Ok(Ok(value))
            }
            Err(error) => {
                transaction.rollback().map_err(classify)?;
                Ok(Err(error))
            }
        }
    }
}

impl CounterStore for Database {
    fn counter(&self, user_id: i64) -> Result<CounterSnapshot, StoreFault> {
        let row = self
            .conn
            .query_row(
                "SELECT COALESCE(streak, 0), streak_counted_on FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()
            .map_err(classify)?;

        let (value, counted_on) =
            row.ok_or_else(|| StoreFault::InvalidState(format!("unknown user {user_id}")))?;
        let counted_on = counted_on
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, DAY_FORMAT).map_err(|_| {
                    StoreFault::InvalidState(format!("streak day {raw:?} is not a date"))
                })
            })
            .transpose()?;

        Ok(CounterSnapshot { value, counted_on })
    }

    fn set_counter(
        &self,
        user_id: i64,
        value: u32,
        counted_on: Option<NaiveDate>,
    ) -> Result<(), StoreFault> {
        let updated = self
            .conn
            .execute(
                "UPDATE users SET streak = ?2, streak_counted_on = ?3 WHERE id = ?1",
                params![
                    user_id,
                    value,
                    counted_on.map(|day| day.format(DAY_FORMAT).to_string())
                ],
            )
            .map_err(classify)?;

        if updated == 0 {
            return Err(StoreFault::InvalidState(format!("unknown user {user_id}")));
        }

        Ok(())
    }
}

/// Type mismatches mean the stored data is corrupt; everything else is I/O.
fn classify(error: rusqlite::Error) -> StoreFault {
    match error {
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => StoreFault::InvalidState(error.to_string()),
        other => StoreFault::StoreUnavailable(other.into()),
    }
}
