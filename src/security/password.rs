/// Password hashing and verification using bcrypt
///
/// The hash algorithm is treated as a black box with a configurable cost
/// factor; comparison is constant-time inside bcrypt itself.
use crate::error::{AuthError, Result};

/// Hash a password with the given bcrypt cost factor
///
/// Validates basic composition (length, character classes) before hashing.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    validate_password_strength(password)?;
    Ok(bcrypt::hash(password, cost)?)
}

/// Verify a password against its stored hash
///
/// Returns `false` on mismatch; an error only for malformed stored hashes.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, password_hash)?)
}

/// Validate password composition rules
///
/// ## Requirements
///
/// - Minimum 8 characters
/// - At least one uppercase letter
/// - At least one lowercase letter
/// - At least one digit
/// - At least one special character
fn validate_password_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if !has_uppercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }

    if !has_lowercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }

    if !has_digit {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one digit".to_string(),
        ));
    }

    if !has_special {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one special character".to_string(),
        ));
    }

    Ok(())
}
