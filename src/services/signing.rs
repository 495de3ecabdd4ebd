//! Message signing
//!
//! HMAC-SHA256 signatures for cookie values and password reset tokens.
//! A signed message is `base64url(payload).base64url(mac)`; the MAC also
//! covers a purpose string, so a value signed for one cookie cannot be
//! replayed as another.

use anyhow::Result;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies messages with one secret key.
#[derive(Clone)]
pub struct MessageVerifier {
    mac: HmacSha256,
}

impl std::fmt::Debug for MessageVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageVerifier").finish_non_exhaustive()
    }
}

impl MessageVerifier {
    pub fn new(secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("Invalid signing key: {}", e))?;
        Ok(Self { mac })
    }

    /// Sign `payload` for `purpose`.
    pub fn sign(&self, purpose: &str, payload: &[u8]) -> String {
        let tag = self.tag(purpose, payload);
        format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(payload),
            BASE64URL_NOPAD.encode(&tag)
        )
    }

    /// Return the payload if `signed` carries a valid signature for `purpose`.
    pub fn verify(&self, purpose: &str, signed: &str) -> Option<Vec<u8>> {
        let (encoded_payload, encoded_tag) = signed.rsplit_once('.')?;
        let payload = BASE64URL_NOPAD.decode(encoded_payload.as_bytes()).ok()?;
        let tag = BASE64URL_NOPAD.decode(encoded_tag.as_bytes()).ok()?;

        let mut mac = self.mac.clone();
        mac.update(purpose.as_bytes());
        mac.update(&[0]);
        mac.update(&payload);
        mac.verify_slice(&tag).ok()?;

        Some(payload)
    }

    pub fn sign_str(&self, purpose: &str, payload: &str) -> String {
        self.sign(purpose, payload.as_bytes())
    }

    pub fn verify_str(&self, purpose: &str, signed: &str) -> Option<String> {
        self.verify(purpose, signed)
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    fn tag(&self, purpose: &str, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(purpose.as_bytes());
        mac.update(&[0]);
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// A random 256-bit key, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}
