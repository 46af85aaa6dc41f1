use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::consts::{TOTP_DIGITS, TOTP_STEP_SECONDS};

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Why a shared secret could not be turned into an HMAC key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("secret is empty")]
    Empty,
    #[error("invalid base32 character in secret: {0:?}")]
    InvalidCharacter(char),
}

/// HMAC hash used to derive codes. SHA-1 is what TOTP generators default to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

/// Decode an RFC 4648 base32 secret. Case, whitespace and `=` padding are ignored.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, SecretError> {
    let mut out = Vec::with_capacity(secret.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in secret.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase();
        let value = BASE32_ALPHABET
            .iter()
            .position(|&b| b as char == upper)
            .ok_or(SecretError::InvalidCharacter(c))? as u32;

        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    if out.is_empty() {
        return Err(SecretError::Empty);
    }
    Ok(out)
}

/// Compute the code for the window containing `unix_seconds`.
pub fn generate(
    secret: &str,
    unix_seconds: u64,
    algorithm: Algorithm,
) -> Result<String, SecretError> {
    let key = decode_secret(secret)?;
    let counter = (unix_seconds / TOTP_STEP_SECONDS).to_be_bytes();

    let digest = match algorithm {
        Algorithm::Sha1 => sign::<Hmac<Sha1>>(&key, &counter),
        Algorithm::Sha256 => sign::<Hmac<Sha256>>(&key, &counter),
        Algorithm::Sha512 => sign::<Hmac<Sha512>>(&key, &counter),
    };

    Ok(truncate(&digest, TOTP_DIGITS))
}

fn sign<M: Mac + KeyInit>(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 4226 dynamic truncation.
fn truncate(digest: &[u8], digits: u32) -> String {
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = binary % 10u32.pow(digits);
    format!("{:0width$}", code, width = digits as usize)
}
