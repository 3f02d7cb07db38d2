use crate::Database;
use crate::models::{
    AttachmentRow, ConversationRow, ConversationSummaryRow, MessageRow, UserRow,
};
use anyhow::{Result, bail};
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Conversations --

    pub fn create_conversation(&self, id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id) VALUES (?1, ?2)",
                (id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, num_attachments, created_at
                 FROM conversations WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        num_attachments: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    /// All of a user's conversations in creation order, each paired with its
    /// opening user turn (empty string when the thread has none yet).
    pub fn get_conversations_by_user(&self, user_id: &str) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_id, c.num_attachments, c.created_at,
                        COALESCE((SELECT m.content FROM messages m
                                  WHERE m.conversation_id = c.id AND m.role = 'user'
                                  ORDER BY m.ordinal LIMIT 1), '')
                 FROM conversations c
                 WHERE c.user_id = ?1
                 ORDER BY c.created_at, c.rowid",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationSummaryRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        num_attachments: row.get(2)?,
                        created_at: row.get(3)?,
                        message: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a turn to a conversation. The ordinal is assigned under the
    /// connection lock, so positions stay dense and gap-free.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let ordinal: i64 = conn.query_row(
                "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, ordinal)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, conversation_id, role, content, ordinal],
            )?;
            Ok(ordinal)
        })
    }

    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, ordinal, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY ordinal",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        ordinal: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Attachments --

    pub fn insert_attachment(
        &self,
        id: &str,
        conversation_id: &str,
        message_id: Option<&str>,
        file_name: &str,
        stored_name: &str,
        content_type: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attachments (id, conversation_id, message_id, file_name, stored_name, content_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, message_id, file_name, stored_name, content_type],
            )?;
            Ok(())
        })
    }

    /// Atomic counter bump at the SQL level; returns the new count.
    /// Fails when the conversation does not exist.
    pub fn increment_attachment_count(&self, conversation_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET num_attachments = num_attachments + 1 WHERE id = ?1",
                [conversation_id],
            )?;
            if changed == 0 {
                bail!("Conversation not found: {}", conversation_id);
            }
            let count: i64 = conn.query_row(
                "SELECT num_attachments FROM conversations WHERE id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn get_attachments(&self, conversation_id: &str) -> Result<Vec<AttachmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, message_id, file_name, stored_name, content_type, uploaded_at
                 FROM attachments WHERE conversation_id = ?1
                 ORDER BY uploaded_at, rowid",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(AttachmentRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        message_id: row.get(2)?,
                        file_name: row.get(3)?,
                        stored_name: row.get(4)?,
                        content_type: row.get(5)?,
                        uploaded_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
