use crate::db::{CompletionLog, Database};
use crate::streak::{EvaluationUnavailable, StoreFault, UserLocks, refresh_streak};
use chrono::{DateTime, TimeZone};
use std::path::Path;
use tracing::{info, warn};

/// Refresh one user's streak against the SQLite store.
///
/// `locks` orders refreshes inside this process; the SQLite write lock held
/// for the whole refresh orders them against other processes on the same file.
pub fn refresh_stored_streak<Tz: TimeZone>(
    db_path: &Path,
    completion_marker: &str,
    locks: &UserLocks,
    user_id: i64,
    now: &DateTime<Tz>,
) -> Result<u32, EvaluationUnavailable> {
    let fail = |fault: StoreFault| EvaluationUnavailable::new(user_id, fault);

    let result = locks.with_user(user_id, || {
        let database =
            Database::open(db_path).map_err(|error| fail(StoreFault::StoreUnavailable(error)))?;
        let log = CompletionLog::new(&database, completion_marker);

        database
            .with_write_lock(|database| refresh_streak(&log, database, user_id, now))
            .map_err(fail)?
    });

    match &result {
        Ok(streak) => info!(user_id, streak, "streak refreshed"),
        Err(error) => warn!(
            user_id,
            invalid_state = error.is_invalid_state(),
            error = %error,
            "streak refresh failed"
        ),
    }

    result
}
