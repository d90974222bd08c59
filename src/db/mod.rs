pub mod classes;
pub mod progress;
pub mod queries;
pub mod streak_store;

use crate::auth::Role;
use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use classes::{ClassMemberRow, ClassRow};
pub use progress::{ActivityRow, FriendRow, GameRow, GoalRow, LeaderboardRow};
pub use streak_store::CompletionLog;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, username, email, birth_day, birth_month, birth_year, role, COALESCE(streak, 0), join_date, location, bio, education, favorite_game";

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub birth_day: u32,
    pub birth_month: u32,
    pub birth_year: i32,
    pub role: Role,
    pub streak: i64,
    pub join_date: String,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub education: Option<String>,
    pub favorite_game: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub birth_day: u32,
    pub birth_month: u32,
    pub birth_year: i32,
    pub password_hash: String,
    pub role: Role,
    pub join_date: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub password_hash: String,
}

/// Profile fields a user may edit. `None` leaves the stored value as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub location: Option<String>,
    pub bio: Option<String>,
    pub education: Option<String>,
    pub favorite_game: Option<String>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set SQLite busy timeout")?;
        conn.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn create_user(&self, user: &NewUser) -> Result<UserRow> {
        self.conn
            .execute(
                "INSERT INTO users (username, email, birth_day, birth_month, birth_year, password_hash, role, join_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.username,
                    user.email,
                    user.birth_day,
                    user.birth_month,
                    user.birth_year,
                    user.password_hash,
                    user.role.as_str(),
                    user.join_date
                ],
            )
            .context("Failed to insert user")?;

        let user_id = self.conn.last_insert_rowid();
        self.user_by_id(user_id)?
            .context("Inserted user could not be read back")
    }

    pub fn user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id],
                map_user,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                map_user,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn credentials(&self, username: &str) -> Result<Option<Credentials>> {
        self.conn
            .query_row(
                "SELECT id, username, role, password_hash FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(Credentials {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        role: role_column(row, 2)?,
                        password_hash: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query credentials")
    }

    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<Option<UserRow>> {
        let changed = self
            .conn
            .execute(
                "UPDATE users SET
                   location = COALESCE(?2, location),
                   bio = COALESCE(?3, bio),
                   education = COALESCE(?4, education),
                   favorite_game = COALESCE(?5, favorite_game)
                 WHERE id = ?1",
                params![
                    user_id,
                    update.location,
                    update.bio,
                    update.education,
                    update.favorite_game
                ],
            )
            .context("Failed to update profile")?;

        if changed == 0 {
            return Ok(None);
        }

        self.user_by_id(user_id)
    }

    pub fn count_users(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .context("Failed to count users")
    }
}

/// Whether `error` was caused by a UNIQUE or similar constraint.
pub fn is_constraint_violation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation
        )
    })
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        birth_day: row.get(3)?,
        birth_month: row.get(4)?,
        birth_year: row.get(5)?,
        role: role_column(row, 6)?,
        streak: row.get(7)?,
        join_date: row.get(8)?,
        location: row.get(9)?,
        bio: row.get(10)?,
        education: row.get(11)?,
        favorite_game: row.get(12)?,
    })
}

fn role_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Role> {
    let raw: String = row.get(index)?;
    Role::parse(&raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error.into()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Database, NewUser, UserRow};
    use crate::auth::Role;
    use tempfile::TempDir;

    pub fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("test.db")).expect("open db");
        (dir, database)
    }

    pub fn add_user(database: &Database, username: &str, role: Role) -> UserRow {
        database
            .create_user(&NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                birth_day: 1,
                birth_month: 2,
                birth_year: 2012,
                password_hash: "$argon2id$placeholder".to_string(),
                role,
                join_date: "2026-03-01".to_string(),
            })
            .expect("create user")
    }
}
