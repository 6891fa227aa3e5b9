//! Meeting record persistence.
//!
//! CRUD operations for the `meetings` table. Raw SQL with rusqlite, following
//! the same pattern as the other repositories.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Lifecycle status of a meeting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingStatus {
    Created,
    InProgress,
    Finished,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "in_progress" => Ok(Self::InProgress),
            "finished" => Ok(Self::Finished),
            _ => anyhow::bail!("Invalid meeting status: {}", s),
        }
    }
}

/// A meeting record from the database.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: MeetingStatus,
    pub duration_minutes: Option<i64>,
    pub created_at: String,
}

pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a new meeting record (status = created). Returns the meeting ID.
    pub fn insert(
        conn: &Connection,
        title: Option<&str>,
        description: Option<&str>,
        duration_minutes: Option<i64>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO meetings (id, title, description, status, duration_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                title,
                description,
                MeetingStatus::Created.as_str(),
                duration_minutes
            ],
        )
        .context("Failed to insert meeting")?;

        Ok(id)
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<MeetingRecord>> {
        let row = conn
            .query_row(
                "SELECT id, title, description, status, duration_minutes, created_at
                 FROM meetings WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .context("Failed to get meeting")?;

        let Some((id, title, description, status, duration_minutes, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(MeetingRecord {
            id,
            title,
            description,
            status: MeetingStatus::from_str(&status)?,
            duration_minutes,
            created_at,
        }))
    }

    pub fn set_status(conn: &Connection, id: &str, status: MeetingStatus) -> Result<()> {
        let updated = conn
            .execute(
                "UPDATE meetings SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update meeting status")?;

        if updated == 0 {
            anyhow::bail!("Meeting not found: {}", id);
        }

        Ok(())
    }

    /// Record a participant. Duplicate adds are ignored.
    pub fn add_participant(conn: &Connection, meeting_id: &str, user_id: i64) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO meeting_participants (meeting_id, user_id) VALUES (?1, ?2)",
            params![meeting_id, user_id],
        )
        .context("Failed to add meeting participant")?;

        Ok(())
    }

    pub fn is_participant(conn: &Connection, meeting_id: &str, user_id: i64) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM meeting_participants WHERE meeting_id = ?1 AND user_id = ?2",
                params![meeting_id, user_id],
                |row| row.get(0),
            )
            .context("Failed to query meeting participants")?;

        Ok(count > 0)
    }
}
