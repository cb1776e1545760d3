//! Database module for the triage assistant
//!
//! Provides persistence for conversations and messages.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

const CONVERSATION_COLUMNS: &str = "id, user_id, state, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "message_id, conversation_id, sequence_id, role, content, metadata, \
                               client_message_id, reply_to, created_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Conversation Operations ====================

    /// Get conversation by ID
    pub fn get_conversation(&self, id: &str) -> DbResult<Conversation> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
            parse_conversation_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::ConversationNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// The user's active (not complete) conversation, if any
    pub fn active_conversation(&self, user_id: &str) -> DbResult<Option<Conversation>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE user_id = ?1 AND is_complete = 0"
            ),
            params![user_id],
            parse_conversation_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Insert or update a conversation
    #[allow(dead_code)] // Backs `ConversationStore::save`
    pub fn save_conversation(&self, conversation: &Conversation) -> DbResult<()> {
        let conn = self.conn()?;
        upsert_conversation(&conn, conversation)
    }

    // ==================== Message Operations ====================

    /// Append a message to a conversation
    #[allow(dead_code)] // Backs `ConversationStore::append`
    pub fn add_message(&self, conversation_id: &str, message: &NewMessage) -> DbResult<Message> {
        let conn = self.conn()?;
        insert_message(&conn, conversation_id, message, Utc::now())
    }

    /// Save the conversation and append the turn's messages atomically
    pub fn commit_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let stored = commit_in(&tx, conversation, messages)?;
        tx.commit()?;
        Ok(stored)
    }

    /// Get messages for a conversation
    pub fn get_messages(&self, conversation_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1 ORDER BY sequence_id ASC"
        ))?;

        let rows = stmt.query_map(params![conversation_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Assistant reply already produced for a client message id of this user.
    /// Used for idempotent message sends.
    pub fn find_reply(
        &self,
        user_id: &str,
        client_message_id: &str,
    ) -> DbResult<Option<(Conversation, Message)>> {
        let conn = self.conn()?;
        let reply = conn
            .query_row(
                "SELECT a.message_id, a.conversation_id, a.sequence_id, a.role, a.content,
                        a.metadata, a.client_message_id, a.reply_to, a.created_at
                 FROM messages u
                 JOIN conversations c ON c.id = u.conversation_id
                 JOIN messages a ON a.reply_to = u.message_id
                 WHERE c.user_id = ?1 AND u.client_message_id = ?2
                 ORDER BY u.sequence_id DESC, a.sequence_id DESC
                 LIMIT 1",
                params![user_id, client_message_id],
                parse_message_row,
            )
            .optional()?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        let conversation = conn.query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![reply.conversation_id],
            parse_conversation_row,
        )?;
        Ok(Some((conversation, reply)))
    }
}

fn commit_in(
    tx: &Transaction<'_>,
    conversation: &Conversation,
    messages: &[NewMessage],
) -> DbResult<Vec<Message>> {
    upsert_conversation(tx, conversation)?;
    let now = Utc::now();
    messages
        .iter()
        .map(|m| insert_message(tx, &conversation.id, m, now))
        .collect()
}

fn upsert_conversation(conn: &Connection, conversation: &Conversation) -> DbResult<()> {
    let state_json = serde_json::to_string(&conversation.state)?;
    let now = Utc::now();

    conn.execute(
        "INSERT INTO conversations (id, user_id, state, is_complete, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            is_complete = excluded.is_complete,
            updated_at = excluded.updated_at",
        params![
            conversation.id,
            conversation.user_id,
            state_json,
            conversation.is_complete(),
            conversation.created_at.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_message(
    conn: &Connection,
    conversation_id: &str,
    message: &NewMessage,
    now: DateTime<Utc>,
) -> DbResult<Message> {
    // Get next sequence ID
    let sequence_id: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;

    let metadata_str = message
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO messages (message_id, conversation_id, sequence_id, role, content, metadata,
                               client_message_id, reply_to, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            message.message_id,
            conversation_id,
            sequence_id,
            message.role.as_str(),
            message.content,
            metadata_str,
            message.client_message_id,
            message.reply_to,
            now.to_rfc3339(),
        ],
    )?;

    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), conversation_id],
    )?;

    Ok(Message {
        message_id: message.message_id.clone(),
        conversation_id: conversation_id.to_string(),
        sequence_id,
        role: message.role,
        content: message.content.clone(),
        metadata: message.metadata.clone(),
        client_message_id: message.client_message_id.clone(),
        reply_to: message.reply_to.clone(),
        created_at: now,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        state: json_column(2, &row.get::<_, String>(2)?)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role = row
        .get::<_, String>(3)?
        .parse::<MessageRole>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;

    let metadata = row
        .get::<_, Option<String>>(5)?
        .map(|s| json_column(5, &s))
        .transpose()?;

    Ok(Message {
        message_id: row.get(0)?,
        conversation_id: row.get(1)?,
        sequence_id: row.get(2)?,
        role,
        content: row.get(4)?,
        metadata,
        client_message_id: row.get(6)?,
        reply_to: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
