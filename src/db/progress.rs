use super::Database;
use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct GameRow {
    pub id: i64,
    pub game_name: String,
    pub score: i64,
    pub level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub id: i64,
    pub text: String,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendRow {
    pub id: i64,
    pub friend_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalRow {
    pub id: i64,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub username: String,
    pub total_score: i64,
}

impl Database {
    pub fn games_for_user(&self, user_id: i64) -> Result<Vec<GameRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, game_name, score, level FROM games WHERE user_id = ?1 ORDER BY game_name ASC",
        )?;

        let rows = statement
            .query_map(params![user_id], |row| {
                Ok(GameRow {
                    id: row.get(0)?,
                    game_name: row.get(1)?,
                    score: row.get(2)?,
                    level: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query games")?;

        Ok(rows)
    }

    /// Add `score` to the user's running total for `game_name`, keep the
    /// highest level seen, and log `activity_text` in the same transaction.
    pub fn record_game_play(
        &mut self,
        user_id: i64,
        game_name: &str,
        score: i64,
        level: i64,
        activity_text: &str,
        recorded_at: i64,
    ) -> Result<GameRow> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        transaction
            .execute(
                "INSERT INTO games (user_id, game_name, score, level) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, game_name)
                 DO UPDATE SET score = games.score + excluded.score, level = MAX(games.level, excluded.level)",
                params![user_id, game_name, score, level],
            )
            .context("Failed to upsert game")?;

        let game = transaction
            .query_row(
                "SELECT id, game_name, score, level FROM games WHERE user_id = ?1 AND game_name = ?2",
                params![user_id, game_name],
                |row| {
                    Ok(GameRow {
                        id: row.get(0)?,
                        game_name: row.get(1)?,
                        score: row.get(2)?,
                        level: row.get(3)?,
                    })
                },
            )
            .context("Failed to read game after upsert")?;

        transaction
            .execute(
                "INSERT INTO activities (user_id, activity_text, recorded_at) VALUES (?1, ?2, ?3)",
                params![user_id, activity_text, recorded_at],
            )
            .context("Failed to insert game activity")?;

        transaction
            .commit()
            .context("Failed to commit game play")?;

        Ok(game)
    }

    pub fn insert_activity(&self, user_id: i64, text: &str, recorded_at: i64) -> Result<ActivityRow> {
        self.conn
            .execute(
                "INSERT INTO activities (user_id, activity_text, recorded_at) VALUES (?1, ?2, ?3)",
                params![user_id, text, recorded_at],
            )
            .context("Failed to insert activity")?;

        Ok(ActivityRow {
            id: self.conn.last_insert_rowid(),
            text: text.to_string(),
            recorded_at,
        })
    }

    pub fn recent_activities(&self, user_id: i64, limit: usize) -> Result<Vec<ActivityRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, activity_text, recorded_at
             FROM activities
             WHERE user_id = ?1
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = statement
            .query_map(params![user_id, limit as i64], |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    recorded_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query activities")?;

        Ok(rows)
    }

    pub fn badges_for_user(&self, user_id: i64) -> Result<Vec<String>> {
        let mut statement = self
            .conn
            .prepare("SELECT badge_name FROM badges WHERE user_id = ?1 ORDER BY id ASC")?;

        let rows = statement
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to query badges")?;

        Ok(rows)
    }

    /// Returns false when the user already holds the badge.
    pub fn award_badge(&self, user_id: i64, badge_name: &str) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO badges (user_id, badge_name) VALUES (?1, ?2)",
                params![user_id, badge_name],
            )
            .context("Failed to award badge")?;

        Ok(inserted > 0)
    }

    pub fn friends_for_user(&self, user_id: i64) -> Result<Vec<FriendRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, friend_name FROM friends WHERE user_id = ?1 ORDER BY friend_name ASC",
        )?;

        let rows = statement
            .query_map(params![user_id], |row| {
                Ok(FriendRow {
                    id: row.get(0)?,
                    friend_name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query friends")?;

        Ok(rows)
    }

    pub fn add_friend(&self, user_id: i64, friend_name: &str) -> Result<FriendRow> {
        self.conn
            .execute(
                "INSERT INTO friends (user_id, friend_name) VALUES (?1, ?2)",
                params![user_id, friend_name],
            )
            .context("Failed to add friend")?;

        Ok(FriendRow {
            id: self.conn.last_insert_rowid(),
            friend_name: friend_name.to_string(),
        })
    }

    pub fn remove_friend(&self, user_id: i64, friend_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM friends WHERE id = ?1 AND user_id = ?2",
                params![friend_id, user_id],
            )
            .context("Failed to remove friend")?;

        Ok(deleted > 0)
    }

    pub fn goals_for_user(&self, user_id: i64) -> Result<Vec<GoalRow>> {
        let mut statement = self
            .conn
            .prepare("SELECT id, goal_text, completed FROM goals WHERE user_id = ?1 ORDER BY id ASC")?;

        let rows = statement
            .query_map(params![user_id], |row| {
                Ok(GoalRow {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    completed: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query goals")?;

        Ok(rows)
    }

    pub fn add_goal(&self, user_id: i64, text: &str) -> Result<GoalRow> {
        self.conn
            .execute(
                "INSERT INTO goals (user_id, goal_text) VALUES (?1, ?2)",
                params![user_id, text],
            )
            .context("Failed to add goal")?;

        Ok(GoalRow {
            id: self.conn.last_insert_rowid(),
            text: text.to_string(),
            completed: false,
        })
    }

    pub fn set_goal_completed(
        &self,
        user_id: i64,
        goal_id: i64,
        completed: bool,
    ) -> Result<Option<GoalRow>> {
        self.conn
            .query_row(
                "UPDATE goals SET completed = ?3 WHERE id = ?1 AND user_id = ?2
                 RETURNING id, goal_text, completed",
                params![goal_id, user_id, completed],
                |row| {
                    Ok(GoalRow {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        completed: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to update goal")
    }

    pub fn delete_goal(&self, user_id: i64, goal_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM goals WHERE id = ?1 AND user_id = ?2",
                params![goal_id, user_id],
            )
            .context("Failed to delete goal")?;

        Ok(deleted > 0)
    }

    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardRow>> {
        let mut statement = self.conn.prepare(
            "SELECT u.username, COALESCE(SUM(g.score), 0) AS total_score
             FROM users u
             LEFT JOIN games g ON u.id = g.user_id
             GROUP BY u.id, u.username
             ORDER BY total_score DESC, u.username ASC
             LIMIT ?1",
        )?;

        let rows = statement
            .query_map(params![limit as i64], |row| {
                Ok(LeaderboardRow {
                    username: row.get(0)?,
                    total_score: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query leaderboard")?;

        Ok(rows)
    }
}
