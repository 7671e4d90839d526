use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Conversation, UserId};
use crate::row;

impl Database {
    /// Find the conversation for the unordered pair `{a, b}`, creating it if
    /// it does not exist yet.
    ///
    /// Idempotent: the insert is keyed on the sorted participant columns,
    /// which are `UNIQUE` together, so racing first-sends converge on the
    /// same row.
    pub fn resolve_conversation(&self, a: &UserId, b: &UserId) -> Result<Conversation> {
        let (low, high) = a.ordered_pair(b);
        let id = Uuid::new_v4();

        let inserted = self.conn().execute(
            "INSERT INTO conversations (id, participant_a, participant_b, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(participant_a, participant_b) DO NOTHING",
            params![
                id.to_string(),
                low.as_str(),
                high.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        if inserted > 0 {
            tracing::debug!(conversation = %id, a = %low, b = %high, "created conversation");
        }

        self.find_conversation(a, b)?.ok_or(StoreError::NotFound)
    }

    /// Look up the conversation for `{a, b}` without creating it.
    pub fn find_conversation(&self, a: &UserId, b: &UserId) -> Result<Option<Conversation>> {
        let (low, high) = a.ordered_pair(b);
        let conversation = self
            .conn()
            .query_row(
                "SELECT id, participant_a, participant_b, created_at
                 FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
                params![low.as_str(), high.as_str()],
                |row| {
                    let id: String = row.get(0)?;
                    let first: String = row.get(1)?;
                    let second: String = row.get(2)?;
                    let created_at: String = row.get(3)?;

                    Ok(Conversation {
                        id: row::uuid(0, &id)?,
                        participants: (row::user(1, &first)?, row::user(2, &second)?),
                        created_at: row::timestamp(3, &created_at)?,
                    })
                },
            )
            .optional()?;
        Ok(conversation)
    }

    /// Number of conversation rows recorded for `{a, b}`.
    pub fn count_conversations(&self, a: &UserId, b: &UserId) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE (participant_a = ?1 AND participant_b = ?2)
                OR (participant_a = ?2 AND participant_b = ?1)",
            params![a.as_str(), b.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
