//! SQLite persistence for users, tokens, meetings, and transcripts.
//!
//! Raw SQL with rusqlite, no ORM. Connections are opened per operation and
//! migrated on open; the schema is additive (CREATE TABLE IF NOT EXISTS).

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub mod meetings;
pub mod transcripts;
pub mod users;

pub use meetings::{MeetingRecord, MeetingRepository, MeetingStatus};
pub use transcripts::TranscriptRepository;
pub use users::{TokenRepository, UserRecord, UserRepository};


/// Open the application database, creating and migrating it if needed.
pub fn init_db() -> Result<Connection> {
    let db_path = crate::global::db_file()?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    open(&db_path)
}

/// Open a database at an explicit path (used by tests and tools).
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).context("Failed to open database connection")?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            date_joined TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create users table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tokens (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            expires_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create tokens table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY,
            title TEXT,
            description TEXT,
            status TEXT NOT NULL,
            duration_minutes INTEGER,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create meetings table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_participants (
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            UNIQUE(meeting_id, user_id)
        )",
        [],
    )
    .context("Failed to create meeting_participants table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transcripts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            text TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create transcripts table")?;

    Ok(())
}
