//! Random per-session identifiers.

use std::fmt;

use rand::Rng;

/// Length of a session identifier in bytes.
pub const ID_LEN: usize = 22;

/// Characters a session identifier is drawn from, `[A-Z0-9a-z@_]`.
pub const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789abcdefghijklmnopqrstuvwxyz@_";

/// Identifier that disambiguates a session's control frames from
/// ordinary program output.
///
/// 22 characters over a 64-symbol alphabet give 132 bits, so output that
/// happens to contain a well-formed frame for this session is implausible.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; ID_LEN]);

impl SessionId {
    /// Draws a fresh identifier from the thread-local RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut id = [0u8; ID_LEN];
        for b in &mut id {
            *b = ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())];
        }
        Self(id)
    }

    /// Builds an identifier from raw bytes, rejecting anything outside
    /// [`ID_ALPHABET`].
    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Option<Self> {
        bytes
            .iter()
            .all(|b| ID_ALPHABET.contains(b))
            .then_some(Self(bytes))
    }

    /// Returns the identifier bytes.
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Returns the identifier as text. Always ASCII.
    pub fn as_str(&self) -> &str {
        // Every byte comes from ID_ALPHABET, which is ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_use_the_alphabet() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), ID_LEN);
        assert!(id.as_bytes().iter().all(|b| ID_ALPHABET.contains(b)));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn from_bytes_rejects_foreign_characters() {
        let mut raw = *b"abcdefghijklmnopqrstuv";
        assert!(SessionId::from_bytes(raw).is_some());
        raw[3] = b'$';
        assert!(SessionId::from_bytes(raw).is_none());
    }
}
