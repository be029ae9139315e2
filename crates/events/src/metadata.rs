//! Correlation metadata shared by every event of a keel process.

use std::sync::OnceLock;
use uuid::Uuid;

/// Environment variable a parent process sets to have keel log under its
/// correlation ID.
pub const CORRELATION_ID_ENV: &str = "KEEL_CORRELATION_ID";

static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Correlation ID of this process.
///
/// Taken from [`CORRELATION_ID_ENV`] when it holds a UUID, generated
/// otherwise. Fixed after the first call.
#[must_use]
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(|| {
        std::env::var(CORRELATION_ID_ENV)
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .unwrap_or_else(Uuid::new_v4)
    })
}

/// Fix the correlation ID before anything reads it.
///
/// Returns `false` when an ID is already in place.
pub fn set_correlation_id(id: Uuid) -> bool {
    CORRELATION_ID.set(id).is_ok()
}

/// Current UTC time in RFC 3339 form, used for span start times.
#[must_use]
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
