use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (likes, matches, messages)");
        conn.execute_batch(
            "
            -- One directed edge per (liker, liked).
            CREATE TABLE likes (
                id          TEXT PRIMARY KEY,
                liker_id    TEXT NOT NULL,
                liked_id    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE(liker_id, liked_id),
                CHECK(liker_id <> liked_id)
            );

            CREATE INDEX idx_likes_liked ON likes(liked_id);

            -- Pair stored canonically: user_a sorts before user_b.
            CREATE TABLE matches (
                id          TEXT PRIMARY KEY,
                user_a      TEXT NOT NULL,
                user_b      TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE(user_a, user_b),
                CHECK(user_a < user_b)
            );

            CREATE INDEX idx_matches_user_b ON matches(user_b);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES matches(id),
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL CHECK(length(trim(content)) > 0),
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
