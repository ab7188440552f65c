//! Signer key loading.
//!
//! `WALLET_PRIVATE_KEY` may be a base58 string, a base64 string, or a JSON
//! byte array (the `solana-keygen` file format). All three decode to the
//! 64-byte ed25519 keypair; a 32-byte value is treated as a seed.

use base64::Engine;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::keypair_from_seed;

use crate::error::{ChainError, Result};

/// Decode a wallet secret into a [`Keypair`].
pub fn load_keypair(raw: &str) -> Result<Keypair> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ChainError::InvalidKey("empty key".into()));
    }

    if raw.starts_with('[') {
        let bytes: Vec<u8> = serde_json::from_str(raw)
            .map_err(|e| ChainError::InvalidKey(format!("bad JSON byte array: {e}")))?;
        return keypair_from_bytes(&bytes);
    }

    if let Ok(bytes) = bs58::decode(raw).into_vec() {
        if let Ok(keypair) = keypair_from_bytes(&bytes) {
            return Ok(keypair);
        }
    }

    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
        if let Ok(keypair) = keypair_from_bytes(&bytes) {
            return Ok(keypair);
        }
    }

    Err(ChainError::InvalidKey(
        "expected base58, base64, or JSON byte array".into(),
    ))
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair> {
    match bytes.len() {
        64 => Keypair::from_bytes(bytes)
            .map_err(|e| ChainError::InvalidKey(format!("bad keypair bytes: {e}"))),
        32 => keypair_from_seed(bytes)
            .map_err(|e| ChainError::InvalidKey(format!("bad seed bytes: {e}"))),
        n => Err(ChainError::InvalidKey(format!(
            "expected 32 or 64 key bytes, got {n}"
        ))),
    }
}
