use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use homefinder_shared::errors::{AppError, AppResult, ErrorCode};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
const BACKUP_CODE_COUNT: usize = 8;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::new(
            ErrorCode::PasswordTooWeak,
            "password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::new(
            ErrorCode::PasswordTooWeak,
            "password must contain at least one number",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::new(
            ErrorCode::PasswordTooWeak,
            "password must contain at least one letter",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TOTP (two-factor)
// ---------------------------------------------------------------------------

pub struct TotpSetup {
    /// Base32 secret, persisted against the user until enable confirms it.
    pub secret: String,
    /// otpauth:// URL for the client to render as a QR code.
    pub otpauth_url: String,
}

fn build_totp(secret_base32: &str, account: &str) -> AppResult<TOTP> {
    let bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| AppError::internal(format!("invalid totp secret: {e:?}")))?;
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_STEP,
        bytes,
        Some("HomeFinder".to_string()),
        account.to_string(),
    )
    .map_err(|e| AppError::internal(format!("totp construction failed: {e}")))
}

/// Fresh secret for a 2FA enrollment. Nothing is enabled until the user
/// confirms a code generated from it.
pub fn generate_totp_setup(account_email: &str) -> AppResult<TotpSetup> {
    let secret = Secret::generate_secret().to_encoded().to_string();
    let totp = build_totp(&secret, account_email)?;
    Ok(TotpSetup {
        otpauth_url: totp.get_url(),
        secret,
    })
}

/// Check a 6-digit code against the stored secret, with the usual one-step
/// clock skew tolerance.
pub fn verify_totp_code(secret_base32: &str, code: &str) -> AppResult<bool> {
    let totp = build_totp(secret_base32, "verification")?;
    totp.check_current(code)
        .map_err(|e| AppError::internal(format!("totp clock error: {e}")))
}

// ---------------------------------------------------------------------------
// Backup codes
// ---------------------------------------------------------------------------

/// One-time recovery codes. Plaintext goes to the user exactly once; only
/// SHA-256 digests are stored.
pub fn generate_backup_codes() -> (Vec<String>, serde_json::Value) {
    let mut rng = rand::thread_rng();
    let codes: Vec<String> = (0..BACKUP_CODE_COUNT)
        .map(|_| format!("{:04}-{:04}", rng.gen_range(0..10_000), rng.gen_range(0..10_000)))
        .collect();
    let hashed: Vec<String> = codes.iter().map(|c| hash_backup_code(c)).collect();
    (codes, serde_json::json!(hashed))
}

fn hash_backup_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("s3cure-pass").unwrap();
        assert!(verify_password("s3cure-pass", &hash).unwrap());
        assert!(!verify_password("wrong-pass", &hash).unwrap());
    }

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("letters123").is_ok());
    }

    #[test]
    fn totp_setup_produces_a_scannable_url() {
        let setup = generate_totp_setup("user@example.com").unwrap();
        assert!(setup.otpauth_url.starts_with("otpauth://totp/"));
        assert!(setup.otpauth_url.contains("HomeFinder"));
        assert!(!setup.secret.is_empty());
    }

    #[test]
    fn current_totp_code_verifies() {
        let setup = generate_totp_setup("user@example.com").unwrap();
        let totp = build_totp(&setup.secret, "user@example.com").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_totp_code(&setup.secret, &code).unwrap());
        assert!(!verify_totp_code(&setup.secret, "000000").unwrap() || code == "000000");
    }

    #[test]
    fn backup_codes_are_stored_as_digests_only() {
        let (codes, stored) = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);

        let hashes = stored.as_array().unwrap();
        assert_eq!(hashes.len(), BACKUP_CODE_COUNT);
        for (code, hash) in codes.iter().zip(hashes) {
            // Plaintext never appears in the persisted value
            assert_ne!(hash.as_str().unwrap(), code);
            assert_eq!(hash.as_str().unwrap(), hash_backup_code(code));
        }
    }
}
