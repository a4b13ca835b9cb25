/// Two-factor authentication (TOTP) and backup codes
///
/// TOTP per RFC 6238: SHA-1, 6 digits, 30-second step. Verification accepts a
/// drift window of ±2 steps to absorb clock skew; the window is a fixed
/// constant, not configuration, to bound the attack surface. Secrets are 20
/// random bytes, base32-encoded (RFC 4648) for authenticator apps.
use crate::error::{AuthError, Result};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use totp_lite::{totp_custom, Sha1};

/// Fixed drift tolerance in 30-second steps, applied in both directions
const DRIFT_STEPS: i64 = 2;
const STEP_SECS: u64 = 30;
const DIGITS: u32 = 6;
const SECRET_BYTES: usize = 20;

/// Number of single-use backup codes minted per enable/regenerate
pub const BACKUP_CODE_COUNT: usize = 10;

pub struct TotpGenerator;

impl TotpGenerator {
    /// Generate a new base32-encoded TOTP secret
    pub fn generate_secret() -> String {
        let mut rng = rand::thread_rng();
        let mut secret_bytes = [0u8; SECRET_BYTES];
        rng.fill(&mut secret_bytes);
        base32_encode(&secret_bytes)
    }

    /// Build the otpauth:// URI encoded into the enrollment QR code
    pub fn provisioning_uri(email: &str, secret: &str, issuer: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECS}",
            account = urlencoding::encode(email),
        )
    }

    /// Verify a 6-digit code against a stored secret at the current time
    pub fn verify_code(secret: &str, code: &str) -> Result<bool> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| AuthError::Internal("system clock before epoch".to_string()))?
            .as_secs();
        Self::verify_code_at(secret, code, now)
    }

    /// Verify a code at an explicit timestamp (drift window of ±2 steps)
    pub fn verify_code_at(secret: &str, code: &str, now_secs: u64) -> Result<bool> {
        if code.len() != DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let secret_bytes = base32_decode(secret).ok_or(AuthError::InvalidCode)?;
        if secret_bytes.len() != SECRET_BYTES {
            return Err(AuthError::InvalidCode);
        }

        for step_offset in -DRIFT_STEPS..=DRIFT_STEPS {
            let at = now_secs as i64 + step_offset * STEP_SECS as i64;
            if at < 0 {
                continue;
            }
            let expected = totp_custom::<Sha1>(STEP_SECS, DIGITS, &secret_bytes, at as u64);
            if constant_time_eq(code.as_bytes(), expected.as_bytes()) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Generate backup codes for account recovery (8 hex characters each)
    ///
    /// Only hashes are persisted; the plaintext codes are shown to the user
    /// exactly once.
    pub fn generate_backup_codes() -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..BACKUP_CODE_COUNT)
            .map(|_| {
                let random: u32 = rng.gen();
                format!("{random:08x}")
            })
            .collect()
    }

    /// Hash a backup code for storage (hex-encoded SHA-256)
    pub fn hash_backup_code(code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Constant-time byte comparison; unequal lengths compare unequal
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Computes the code an authenticator app would show at the given time
#[cfg(test)]
pub(crate) fn code_at(secret: &str, at_secs: u64) -> Result<String> {
    let bytes = base32_decode(secret).ok_or(AuthError::InvalidCode)?;
    Ok(totp_custom::<Sha1>(STEP_SECS, DIGITS, &bytes, at_secs))
}

/// Base32 encode (RFC 4648, no padding needed for 20-byte secrets)
fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut output = String::new();
    let mut buffer = 0u32;
    let mut buffer_size = 0;

    for byte in data {
        buffer = (buffer << 8) | (*byte as u32);
        buffer_size += 8;

        while buffer_size >= 5 {
            buffer_size -= 5;
            let index = ((buffer >> buffer_size) & 0x1f) as usize;
            output.push(ALPHABET[index] as char);
        }
    }

    if buffer_size > 0 {
        buffer <<= 5 - buffer_size;
        let index = (buffer & 0x1f) as usize;
        output.push(ALPHABET[index] as char);
    }

    output
}

/// Base32 decode (RFC 4648)
fn base32_decode(data: &str) -> Option<Vec<u8>> {
    let data = data.trim_end_matches('=');
    let mut buffer = 0u32;
    let mut buffer_size = 0;
    let mut output = Vec::new();

    for ch in data.chars() {
        let value = match ch {
            'A'..='Z' => (ch as u32) - ('A' as u32),
            '2'..='7' => (ch as u32) - ('2' as u32) + 26,
            _ => return None,
        };

        buffer = (buffer << 5) | value;
        buffer_size += 5;

        if buffer_size >= 8 {
            buffer_size -= 8;
            output.push(((buffer >> buffer_size) & 0xff) as u8);
        }
    }

    Some(output)
}
