//! Record identifiers.
//!
//! Users, keystore records and API keys are keyed by UUIDv7 generated
//! app-side, so insertion order and id order agree and lookups by creation
//! time need no extra index.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Parse a client-supplied record id.
///
/// Returns `None` for anything that is not a hyphenated or simple UUID, so
/// callers can reject the request before it reaches the database.
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::try_parse(raw.trim()).ok()
}
