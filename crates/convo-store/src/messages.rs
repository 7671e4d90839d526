use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Attachment, Message, ReplyPreview};
use crate::row;

const SELECT_MESSAGE: &str = "SELECT m.id, m.conversation_id, m.sender_id, m.receiver_id, m.body,
        m.attachments, m.reply_to, m.reply_preview, m.edited, m.edited_at,
        m.created_at, m.updated_at
 FROM messages m";

impl Database {
    /// Persist a message and append it to its conversation in one
    /// transaction. Either both rows land or neither does.
    pub fn append_message(&mut self, message: &Message) -> Result<()> {
        let attachments = serde_json::to_string(&message.attachments)?;
        let reply_preview = message
            .reply_preview
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, body, attachments,
                                   reply_to, reply_preview, edited, edited_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.as_str(),
                message.receiver_id.as_str(),
                message.message,
                attachments,
                message.reply_to.map(|id| id.to_string()),
                reply_preview,
                message.edited,
                message.edited_at.map(|at| at.to_rfc3339()),
                message.created_at.to_rfc3339(),
                message.updated_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "INSERT INTO conversation_messages (conversation_id, seq, message_id)
             SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2
             FROM conversation_messages WHERE conversation_id = ?1",
            params![message.conversation_id.to_string(), message.id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_message_by_id(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("{SELECT_MESSAGE} WHERE m.id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// All messages of a conversation in append order.
    pub fn get_messages_for_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MESSAGE}
             JOIN conversation_messages cm ON cm.message_id = m.id
             WHERE cm.conversation_id = ?1
             ORDER BY cm.seq ASC"
        ))?;

        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Replace the text of a message and mark it edited.
    ///
    /// No version check: the last write wins.
    pub fn update_message_text(
        &self,
        id: Uuid,
        text: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message> {
        let stamp = edited_at.to_rfc3339();
        let affected = self.conn().execute(
            "UPDATE messages SET body = ?1, edited = 1, edited_at = ?2, updated_at = ?2
             WHERE id = ?3",
            params![text, stamp, id.to_string()],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_message_by_id(id)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let receiver: String = row.get(3)?;
    let body: String = row.get(4)?;
    let attachments: String = row.get(5)?;
    let reply_to: Option<String> = row.get(6)?;
    let reply_preview: Option<String> = row.get(7)?;
    let edited: bool = row.get(8)?;
    let edited_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    let attachments: Vec<Attachment> = row::json(5, &attachments)?;
    let reply_preview: Option<ReplyPreview> = reply_preview
        .map(|raw| row::json(7, &raw))
        .transpose()?;

    Ok(Message {
        id: row::uuid(0, &id)?,
        conversation_id: row::uuid(1, &conversation_id)?,
        sender_id: row::user(2, &sender)?,
        receiver_id: row::user(3, &receiver)?,
        message: body,
        attachments,
        reply_to: reply_to.map(|raw| row::uuid(6, &raw)).transpose()?,
        reply_preview,
        edited,
        edited_at: edited_at.map(|raw| row::timestamp(9, &raw)).transpose()?,
        created_at: row::timestamp(10, &created_at)?,
        updated_at: row::timestamp(11, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn new_message(db: &Database, from: &str, to: &str, text: &str) -> Message {
        let (sender, receiver) = (user(from), user(to));
        let conversation = db.resolve_conversation(&sender, &receiver).unwrap();
        let now = Utc::now();
        Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender_id: sender,
            receiver_id: receiver,
            message: text.to_string(),
            attachments: vec![],
            reply_to: None,
            reply_preview: None,
            edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_append_and_list_in_order() {
        let mut db = Database::open_in_memory().unwrap();

        let first = new_message(&db, "alice", "bob", "one");
        let second = new_message(&db, "bob", "alice", "two");
        db.append_message(&first).unwrap();
        db.append_message(&second).unwrap();

        let listed = db
            .get_messages_for_conversation(first.conversation_id)
            .unwrap();
        let texts: Vec<_> = listed.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
        assert_eq!(listed[0], first);
    }

    #[test]
    fn test_attachments_and_reply_round_trip() {
        let mut db = Database::open_in_memory().unwrap();

        let mut message = new_message(&db, "alice", "bob", "");
        message.attachments.push(Attachment {
            url: "/uploads/1-cat.png".into(),
            media_type: "image/png".into(),
            name: "cat.png".into(),
            size: 1024,
        });
        message.reply_to = Some(Uuid::new_v4());
        message.reply_preview = Some(ReplyPreview {
            sender_name: "Bob".into(),
            text_snippet: "look".into(),
            ..Default::default()
        });
        db.append_message(&message).unwrap();

        assert_eq!(db.get_message_by_id(message.id).unwrap(), message);
    }

    #[test]
    fn test_failed_append_leaves_nothing_behind() {
        let mut db = Database::open_in_memory().unwrap();

        let mut message = new_message(&db, "alice", "bob", "orphan");
        message.conversation_id = Uuid::new_v4();

        assert!(db.append_message(&message).is_err());
        assert!(matches!(
            db.get_message_by_id(message.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_update_message_text() {
        let mut db = Database::open_in_memory().unwrap();
        let message = new_message(&db, "alice", "bob", "draft");
        db.append_message(&message).unwrap();

        let at = Utc::now();
        let updated = db.update_message_text(message.id, "final", at).unwrap();
        assert_eq!(updated.message, "final");
        assert!(updated.edited);
        assert_eq!(updated.edited_at.map(|t| t.timestamp_millis()), Some(at.timestamp_millis()));
        assert_eq!(updated.created_at, message.created_at);
    }

    #[test]
    fn test_update_missing_message() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_message_text(Uuid::new_v4(), "x", Utc::now()),
            Err(StoreError::NotFound)
        ));
    }
}
