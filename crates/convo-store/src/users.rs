use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{UserId, UserProfile};
use crate::row;

impl Database {
    /// Insert or replace the display profile of a user.
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, full_name, profile_photo, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                profile_photo = excluded.profile_photo,
                updated_at = excluded.updated_at",
            params![
                profile.id.as_str(),
                profile.full_name,
                profile.profile_photo,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, id: &UserId) -> Result<Option<UserProfile>> {
        let profile = self
            .conn()
            .query_row(
                "SELECT id, full_name, profile_photo FROM users WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    let id: String = row.get(0)?;
                    Ok(UserProfile {
                        id: row::user(0, &id)?,
                        full_name: row.get(1)?,
                        profile_photo: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Record that `blocker` refuses messages from `blocked`.
    /// Returns `false` when the edge already existed.
    pub fn block(&self, blocker: &UserId, blocked: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![blocker.as_str(), blocked.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn unblock(&self, blocker: &UserId, blocked: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
            params![blocker.as_str(), blocked.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Identities `owner` has blocked, in stable order.
    pub fn block_list(&self, owner: &UserId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT blocked_id FROM blocks WHERE blocker_id = ?1 ORDER BY blocked_id ASC",
        )?;

        let rows = stmt.query_map(params![owner.as_str()], |row| {
            let raw: String = row.get(0)?;
            row::user(0, &raw)
        })?;

        let mut blocked = Vec::new();
        for row in rows {
            blocked.push(row?);
        }
        Ok(blocked)
    }
}
