//! Final meeting transcript persistence.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

pub struct TranscriptRepository;

impl TranscriptRepository {
    /// Store a session's accumulated transcript for a meeting.
    pub fn insert(conn: &Connection, meeting_id: &str, text: &str) -> Result<i64> {
        conn.execute(
            "INSERT INTO transcripts (meeting_id, text) VALUES (?1, ?2)",
            params![meeting_id, text],
        )
        .context("Failed to insert transcript")?;

        Ok(conn.last_insert_rowid())
    }

    pub fn for_meeting(conn: &Connection, meeting_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT text FROM transcripts WHERE meeting_id = ?1 ORDER BY id ASC")
            .context("Failed to prepare transcript query")?;

        let texts = stmt
            .query_map(params![meeting_id], |row| row.get(0))
            .context("Failed to query transcripts")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to map transcripts")?;

        Ok(texts)
    }
}
