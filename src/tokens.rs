//! Single-use hex tokens backing email verification and password reset.
//!
//! A token is valid until its expiry passes or it is consumed once. Expired
//! or unreadable rows are never returned; `consume_token` deletes them on
//! sight and `purge_expired_tokens` sweeps the rest.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::{info, warn};

use crate::db::{Store, format_timestamp, now_iso, parse_timestamp};
use crate::error::Result;
use crate::models::TokenInfo;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// 24 bytes, 48 hex characters.
const TOKEN_BYTES: usize = 24;

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Expiry `ttl_seconds` after `now`, clamped to years 1..=9999 so the stored
/// text keeps its fixed width and still sorts chronologically.
fn expiry_after(now: NaiveDateTime, ttl_seconds: i64) -> NaiveDateTime {
    let in_range = |ts: &NaiveDateTime| (1..=9999).contains(&ts.year());
    if let Some(expiry) = TimeDelta::try_seconds(ttl_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .filter(in_range)
    {
        return expiry;
    }

    let bound = if ttl_seconds > 0 {
        NaiveDate::from_ymd_opt(9999, 12, 31)
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
    } else {
        NaiveDate::from_ymd_opt(1, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
    };
    warn!(ttl_seconds, "token ttl out of range, clamping expiry");
    bound.unwrap_or(now)
}

/// Whether a stored expiry still admits the token. Unparsable values count
/// as expired.
fn is_live(expires_at: &str) -> bool {
    match parse_timestamp(expires_at) {
        Some(expiry) => expiry >= Utc::now().naive_utc(),
        None => {
            warn!(expires_at, "discarding token with malformed expiry");
            false
        }
    }
}

impl Store {
    /// Issue a token for `email` and return it. This is the only time the
    /// raw value is handed out.
    pub fn create_token(&self, email: &str, purpose: &str, ttl_seconds: i64) -> Result<String> {
        let token = generate_token();
        let expires_at = format_timestamp(expiry_after(Utc::now().naive_utc(), ttl_seconds));

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                email TEXT NOT NULL,
                purpose TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
        )?;
        tx.execute(
            "INSERT INTO tokens (token, email, purpose, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![token, email, purpose, expires_at, now_iso()],
        )?;
        tx.commit()?;
        Ok(token)
    }

    /// Redeem a token: returns the email it was issued for and deletes it.
    /// Returns `None` for unknown, expired, or malformed tokens, deleting the
    /// latter two.
    pub fn consume_token(&self, token: &str, purpose: &str) -> Result<Option<String>> {
        let mut conn = self.connect()?;
        // IMMEDIATE takes the write lock up front so two callers can not both
        // read the row before either deletes it.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT email, expires_at FROM tokens WHERE token = ?1 AND purpose = ?2",
                params![token, purpose],
                |row| Ok((row.get("email")?, row.get("expires_at")?)),
            )
            .optional()?;

        let Some((email, expires_at)) = row else {
            return Ok(None);
        };

        tx.execute("DELETE FROM tokens WHERE token = ?1", [token])?;
        tx.commit()?;

        match expires_at {
            Some(expires_at) if !is_live(&expires_at) => Ok(None),
            _ => Ok(Some(email)),
        }
    }

    /// Look at a token without consuming it.
    pub fn get_token_info(&self, token: &str, purpose: &str) -> Result<Option<TokenInfo>> {
        let conn = self.connect()?;
        let info = conn
            .query_row(
                "SELECT token, email, purpose, expires_at, created_at
                 FROM tokens WHERE token = ?1 AND purpose = ?2",
                params![token, purpose],
                |row| {
                    Ok(TokenInfo {
                        token: row.get("token")?,
                        email: row.get("email")?,
                        purpose: row.get("purpose")?,
                        expires_at: row.get("expires_at")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;

        Ok(info.filter(|info| info.expires_at.as_deref().is_none_or(is_live)))
    }

    /// Delete every token whose expiry is at or before now. Meant to be run
    /// periodically by an external scheduler.
    pub fn purge_expired_tokens(&self) -> Result<usize> {
        let conn = self.connect()?;
        let purged = conn.execute("DELETE FROM tokens WHERE expires_at <= ?1", [now_iso()])?;
        info!(purged, "purged expired tokens");
        Ok(purged)
    }
}
