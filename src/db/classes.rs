use super::{Database, is_constraint_violation};
use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

const JOIN_CODE_LENGTH: usize = 6;
const JOIN_CODE_ATTEMPTS: usize = 5;

const CLASS_COLUMNS: &str = "c.id, c.owner_id, c.name, c.join_code, c.created_at,
    (SELECT COUNT(*) FROM class_members m WHERE m.class_id = c.id)";

#[derive(Debug, Clone, Serialize)]
pub struct ClassRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub join_code: String,
    pub created_at: i64,
    pub member_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassMemberRow {
    pub user_id: i64,
    pub username: String,
    pub streak: i64,
    pub total_score: i64,
    pub joined_at: i64,
}

impl Database {
    pub fn create_class(&self, owner_id: i64, name: &str, created_at: i64) -> Result<ClassRow> {
        for _ in 0..JOIN_CODE_ATTEMPTS {
            let code = generate_join_code();
            let inserted = self
                .conn
                .execute(
                    "INSERT INTO classes (owner_id, name, join_code, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![owner_id, name, code, created_at],
                )
                .context("Failed to insert class");

            match inserted {
                Ok(_) => {
                    let class_id = self.conn.last_insert_rowid();
                    return self
                        .class_by_id(class_id)?
                        .context("Inserted class could not be read back");
                }
                Err(error) if is_constraint_violation(&error) => continue,
                Err(error) => return Err(error),
            }
        }

        bail!("Failed to allocate a unique class join code")
    }

    pub fn class_by_id(&self, class_id: i64) -> Result<Option<ClassRow>> {
        self.conn
            .query_row(
                &format!("SELECT {CLASS_COLUMNS} FROM classes c WHERE c.id = ?1"),
                params![class_id],
                map_class,
            )
            .optional()
            .context("Failed to query class")
    }

    pub fn class_by_code(&self, join_code: &str) -> Result<Option<ClassRow>> {
        self.conn
            .query_row(
                &format!("SELECT {CLASS_COLUMNS} FROM classes c WHERE c.join_code = ?1"),
                params![join_code.trim().to_uppercase()],
                map_class,
            )
            .optional()
            .context("Failed to query class by code")
    }

    pub fn classes_owned_by(&self, owner_id: i64) -> Result<Vec<ClassRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes c WHERE c.owner_id = ?1 ORDER BY c.created_at DESC, c.id DESC"
        ))?;

        let rows = statement
            .query_map(params![owner_id], map_class)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query owned classes")?;

        Ok(rows)
    }

    pub fn classes_joined_by(&self, user_id: i64) -> Result<Vec<ClassRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {CLASS_COLUMNS}
             FROM classes c
             JOIN class_members joined ON joined.class_id = c.id
             WHERE joined.user_id = ?1
             ORDER BY joined.joined_at DESC, c.id DESC"
        ))?;

        let rows = statement
            .query_map(params![user_id], map_class)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query joined classes")?;

        Ok(rows)
    }

    /// Returns false when the user is already a member.
    pub fn join_class(&self, class_id: i64, user_id: i64, joined_at: i64) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO class_members (class_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![class_id, user_id, joined_at],
            )
            .context("Failed to join class")?;

        Ok(inserted > 0)
    }

    pub fn class_members(&self, class_id: i64) -> Result<Vec<ClassMemberRow>> {
        let mut statement = self.conn.prepare(
            "SELECT u.id, u.username, COALESCE(u.streak, 0),
                    COALESCE((SELECT SUM(g.score) FROM games g WHERE g.user_id = u.id), 0),
                    m.joined_at
             FROM class_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.class_id = ?1
             ORDER BY u.username ASC",
        )?;

        let rows = statement
            .query_map(params![class_id], |row| {
                Ok(ClassMemberRow {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    streak: row.get(2)?,
                    total_score: row.get(3)?,
                    joined_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query class members")?;

        Ok(rows)
    }

    pub fn remove_class_member(&self, class_id: i64, user_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM class_members WHERE class_id = ?1 AND user_id = ?2",
                params![class_id, user_id],
            )
            .context("Failed to remove class member")?;

        Ok(deleted > 0)
    }

    pub fn delete_class(&self, class_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM classes WHERE id = ?1", params![class_id])
            .context("Failed to delete class")?;

        Ok(deleted > 0)
    }
}

fn generate_join_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JOIN_CODE_LENGTH)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}

fn map_class(row: &Row<'_>) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        join_code: row.get(3)?,
        created_at: row.get(4)?,
        member_count: row.get(5)?,
    })
}
