//! Stateless access tokens for email-contact receivers.
//!
//! A token is `base64url(nonce || XChaCha20-Poly1305(plaintext))` where the
//! plaintext is `payment:<id>`. Nothing is stored; rotating the key revokes
//! every outstanding token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};

use crate::error::PayError;
use crate::models::PaymentId;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

pub fn plaintext_for(payment_id: PaymentId) -> String {
    format!("payment:{}", payment_id)
}

#[derive(Clone)]
pub struct TokenCipher {
    cipher: XChaCha20Poly1305,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher(..)")
    }
}

impl TokenCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Key as 64 hex characters.
    pub fn from_hex(key_hex: &str) -> Result<Self, PayError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| PayError::InternalError(format!("invalid token key: {}", e)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PayError::InternalError("token key must be 32 bytes".into()))?;
        Ok(Self::new(&key))
    }

    /// Fresh random key, returned hex encoded next to the cipher.
    pub fn generate() -> (Self, String) {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        let key_hex = hex::encode(key.as_slice());
        (
            Self {
                cipher: XChaCha20Poly1305::new(&key),
            },
            key_hex,
        )
    }

    pub fn issue(&self, payment_id: PaymentId) -> Result<String, PayError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext_for(payment_id).as_bytes())
            .map_err(|_| PayError::InternalError("token encryption failed".into()))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(nonce.as_slice());
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, PayError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| PayError::forbidden("malformed access token"))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(PayError::forbidden("malformed access token"));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| PayError::forbidden("access token could not be verified"))?;

        String::from_utf8(plaintext).map_err(|_| PayError::forbidden("malformed access token"))
    }

    /// Ok only if `token` was issued for exactly `payment_id`.
    pub fn verify(&self, token: &str, payment_id: PaymentId) -> Result<(), PayError> {
        let plaintext = self.decrypt(token)?;
        if plaintext != plaintext_for(payment_id) {
            return Err(PayError::forbidden("access token is for a different payment"));
        }
        Ok(())
    }
}
