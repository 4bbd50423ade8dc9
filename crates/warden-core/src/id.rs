//! Human-typable approval identifiers.
//!
//! Ids are six characters drawn from an alphabet without the look-alike
//! characters `0 O 1 I L`, so they survive being read aloud or retyped from
//! a phone screen.

use rand::Rng;

/// Characters an id may contain.
pub const ID_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of every generated id.
pub const ID_LENGTH: usize = 6;

/// Generate a random id.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a user-supplied id.
///
/// Returns `None` for anything that can't be a stored id, which also keeps
/// arbitrary input from being turned into a file path.
pub fn normalize_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_ascii_uppercase();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(id)
}
