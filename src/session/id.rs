use rand::Rng;

/// Length of generated session identifiers.
pub const SESSION_ID_LEN: usize = 16;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a random lowercase base-36 session identifier.
///
/// Identifiers double as directory names under the work directory, so the
/// alphabet is restricted to characters that are safe in paths and URLs.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    (0..SESSION_ID_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
