//! User accounts and session cookies.
//!
//! Credentials are stored as salted SHA-256 digests; sessions are stateless
//! HMAC-SHA256-signed cookies carrying the user id and an expiry timestamp.
//! Signature checks go through `Mac::verify_slice`, which is constant-time.

use anyhow::{bail, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// An authenticated user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create an account. Fails when the username or email is already taken.
pub async fn register_user(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User> {
    if username.is_empty() || password.is_empty() {
        bail!("Username and password must not be empty");
    }

    let username_taken: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(pool)
            .await?;
    if username_taken {
        bail!("Username is already taken");
    }

    let email_taken: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if email_taken {
        bail!("Email is already registered");
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.to_string(),
    };
    let salt = Uuid::new_v4().to_string();
    let password_hash = hash_password(&salt, password);
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, salt, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&password_hash)
    .bind(&salt)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(user)
}

/// Check credentials. Returns `None` on unknown username or wrong password.
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, username, email, password_hash, salt FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let stored_hash: String = row.get("password_hash");
    let salt: String = row.get("salt");

    if hash_password(&salt, password) != stored_hash {
        return Ok(None);
    }

    Ok(Some(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

/// Look a user up by id (used when resolving a session cookie).
pub async fn find_user(pool: &SqlitePool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, username, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

// ============ Session cookies ============

/// Produce a signed session cookie value: `b64(user_id):expiry:hex(hmac)`.
pub fn sign_session(secret: &str, user_id: &str, expires_at: i64) -> String {
    let payload = format!("{}:{}", user_id, expires_at);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("{}:{}:{}", B64.encode(user_id), expires_at, sig)
}

/// Verify a session cookie value; returns the user id when the signature
/// checks out and the session has not expired.
pub fn verify_session(secret: &str, value: &str, now: i64) -> Option<String> {
    let mut parts = value.splitn(3, ':');
    let user_b64 = parts.next()?;
    let expiry_str = parts.next()?;
    let sig_hex = parts.next()?;

    let user_id = String::from_utf8(B64.decode(user_b64).ok()?).ok()?;
    let expires_at: i64 = expiry_str.parse().ok()?;
    if expires_at <= now {
        return None;
    }

    let payload = format!("{}:{}", user_id, expires_at);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    let sig = hex::decode(sig_hex).ok()?;
    mac.verify_slice(&sig).ok()?;

    Some(user_id)
}
