//! URL-safe order identifier generation.

use rand::Rng;

/// 33 symbols; `0`, `I`, and `O` are excluded to reduce visual ambiguity.
const ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Identifier length. 12 symbols over a 33-symbol alphabet carry
/// `12 * log2(33) ≈ 60.5` bits of entropy.
const LEN: usize = 12;

/// Generate a new order identifier.
pub fn order_id() -> String {
    let mut rng = rand::thread_rng();
    (0..LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
