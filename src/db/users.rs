//! User accounts and opaque access tokens.
//!
//! Passwords are stored as sha256(salt || password) with a random per-user
//! salt. Tokens are random, stored with an expiry, and resolved back to their
//! user on each WebSocket join or authenticated request.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A user record from the database.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserRecord {
    /// Name attached to this user's outgoing meeting messages.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub struct UserRepository;

impl UserRepository {
    /// Create a user. Fails if the email is already registered.
    pub fn create(
        conn: &Connection,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<i64> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check for existing user")?;

        if existing.is_some() {
            anyhow::bail!("User with this email already exists");
        }

        let salt = Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&salt, password);

        conn.execute(
            "INSERT INTO users (email, first_name, last_name, password_hash, salt)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![email, first_name, last_name, password_hash, salt],
        )
        .context("Failed to insert user")?;

        Ok(conn.last_insert_rowid())
    }

    /// Verify credentials. Returns the user on success, None on bad
    /// email/password.
    pub fn authenticate(
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>> {
        let row: Option<(i64, String, String, String, String)> = conn
            .query_row(
                "SELECT id, first_name, last_name, password_hash, salt
                 FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query user")?;

        let Some((id, first_name, last_name, password_hash, salt)) = row else {
            return Ok(None);
        };

        if hash_password(&salt, password) != password_hash {
            return Ok(None);
        }

        Ok(Some(UserRecord {
            id,
            email: email.to_string(),
            first_name,
            last_name,
        }))
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<UserRecord>> {
        conn.query_row(
            "SELECT id, email, first_name, last_name FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                })
            },
        )
        .optional()
        .context("Failed to get user")
    }
}

pub struct TokenRepository;

impl TokenRepository {
    /// Issue a fresh access token for a user.
    pub fn issue(conn: &Connection, user_id: i64, expire_minutes: i64) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = (Utc::now() + Duration::minutes(expire_minutes)).to_rfc3339();

        conn.execute(
            "INSERT INTO tokens (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, expires_at],
        )
        .context("Failed to insert token")?;

        Ok(token)
    }

    /// Resolve a token back to its user. Expired or unknown tokens resolve to
    /// None.
    pub fn resolve(conn: &Connection, token: &str) -> Result<Option<UserRecord>> {
        let row: Option<(i64, String, String, String, String)> = conn
            .query_row(
                "SELECT u.id, u.email, u.first_name, u.last_name, t.expires_at
                 FROM tokens t JOIN users u ON u.id = t.user_id
                 WHERE t.token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to resolve token")?;

        let Some((id, email, first_name, last_name, expires_at)) = row else {
            return Ok(None);
        };

        let expires = chrono::DateTime::parse_from_rfc3339(&expires_at)
            .context("Malformed token expiry in database")?;
        if expires < Utc::now() {
            return Ok(None);
        }

        Ok(Some(UserRecord {
            id,
            email,
            first_name,
            last_name,
        }))
    }
}
