use rusqlite::{Connection, Row};

use crate::models::{LikeRow, MatchRow, MessageRow};
use crate::{Database, DbError, Result};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, created_at";
const LIKE_COLUMNS: &str = "id, liker_id, liked_id, created_at";
const MATCH_COLUMNS: &str = "id, user_a, user_b, created_at";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (&row.id, &row.conversation_id, &row.sender_id, &row.content, &row.created_at),
            )
            .map_err(|e| DbError::from_insert(e, &format!("message {}", row.id)))?;
            Ok(())
        })
    }

    /// Messages `[offset, offset + limit)` of a conversation, oldest first.
    /// Ties on `created_at` fall back to insertion order.
    pub fn get_messages_page(
        &self,
        conversation_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![conversation_id, limit as i64, offset as i64],
                    message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Newest message of each listed conversation. Conversations without
    /// messages are simply absent from the result.
    pub fn get_latest_messages(&self, conversation_ids: &[String]) -> Result<Vec<MessageRow>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=conversation_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m
                 WHERE m.conversation_id IN ({})
                   AND m.rowid = (
                       SELECT m2.rowid FROM messages m2
                       WHERE m2.conversation_id = m.conversation_id
                       ORDER BY m2.created_at DESC, m2.rowid DESC
                       LIMIT 1
                   )",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = conversation_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Likes --

    /// Fails with [`DbError::Duplicate`] if `liker_id` already likes `liked_id`.
    pub fn insert_like(&self, row: &LikeRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO likes (id, liker_id, liked_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                (&row.id, &row.liker_id, &row.liked_id, &row.created_at),
            )
            .map_err(|e| {
                DbError::from_insert(e, &format!("like {} -> {}", row.liker_id, row.liked_id))
            })?;
            Ok(())
        })
    }

    pub fn find_like(&self, liker_id: &str, liked_id: &str) -> Result<Option<LikeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {LIKE_COLUMNS} FROM likes WHERE liker_id = ?1 AND liked_id = ?2"),
                [liker_id, liked_id],
                like_row,
            )
            .optional()
        })
    }

    /// Returns `true` if a row was removed.
    pub fn delete_like(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM likes WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    /// Likes received by `user_id` from users it has not matched with yet, newest first.
    pub fn get_incoming_likes(&self, user_id: &str) -> Result<Vec<LikeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.liker_id, l.liked_id, l.created_at FROM likes l
                 WHERE l.liked_id = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM matches m
                       WHERE m.user_a = min(l.liker_id, l.liked_id)
                         AND m.user_b = max(l.liker_id, l.liked_id)
                   )
                 ORDER BY l.created_at DESC, l.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], like_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Matches --

    /// Fails with [`DbError::Duplicate`] if the pair already has a match.
    /// `user_a` must sort before `user_b`.
    pub fn insert_match(&self, row: &MatchRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO matches (id, user_a, user_b, created_at) VALUES (?1, ?2, ?3, ?4)",
                (&row.id, &row.user_a, &row.user_b, &row.created_at),
            )
            .map_err(|e| {
                DbError::from_insert(e, &format!("match {} / {}", row.user_a, row.user_b))
            })?;
            Ok(())
        })
    }

    pub fn find_match_by_pair(&self, user_a: &str, user_b: &str) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE user_a = ?1 AND user_b = ?2"),
                [user_a, user_b],
                match_row,
            )
            .optional()
        })
    }

    pub fn get_match(&self, id: &str) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| query_match_by_id(conn, id))
    }

    /// Every match `user_id` is part of, newest first.
    pub fn get_matches_for_user(&self, user_id: &str) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE user_a = ?1 OR user_b = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;

            let rows = stmt
                .query_map([user_id], match_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_matches(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }
}

fn query_match_by_id(conn: &Connection, id: &str) -> Result<Option<MatchRow>> {
    conn.query_row(
        &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
        [id],
        match_row,
    )
    .optional()
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn like_row(row: &Row<'_>) -> rusqlite::Result<LikeRow> {
    Ok(LikeRow {
        id: row.get(0)?,
        liker_id: row.get(1)?,
        liked_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn match_row(row: &Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        created_at: row.get(3)?,
    })
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
