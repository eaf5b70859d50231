use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Session tokens stay valid this long after login.
pub const SESSION_DAYS: i64 = 7;

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        },
    )
}

/// SHA-256 hex of the raw password — the scheme the original web client
/// used, kept so existing accounts keep working.
#[must_use]
pub fn hash_password(password: &str) -> String {
    to_hex(&Sha256::digest(password.as_bytes()))
}

/// 32 random bytes, hex-encoded: the bearer token for one login session.
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    to_hex(&bytes)
}

/// RFC 3339 UTC expiry timestamp for a session created now.
#[must_use]
pub fn session_expiry() -> String {
    (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).to_rfc3339()
}
