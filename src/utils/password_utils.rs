//! Password hashing and verification.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHashString, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::LazyLock};

/// Minimum accepted password length. Checked before hashing; there is no
/// maximum-length or complexity policy.
pub const MIN_PASSWORD_LEN: usize = 8;

static DEFAULT_HASHER: LazyLock<Argon2<'static>> = LazyLock::new(Argon2::default);

/// Hash of the empty password, verified against when the user does not
/// exist so that lookups and failed logins take the same time.
static EMPTY_HASH: LazyLock<PasswordHash> = LazyLock::new(|| hash(""));

/// A hashed password in PHC string form. The string encodes algorithm,
/// parameters, salt and digest, so verification is self-contained.
#[derive(Clone, Debug, Display)]
pub struct PasswordHash(PasswordHashString);

impl Serialize for PasswordHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PasswordHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let hash = PasswordHashString::from_str(&s)
            .map_err(|_| <D::Error as serde::de::Error>::custom("Invalid PHC string"))?;
        Ok(PasswordHash(hash))
    }
}

/// Returns true if the password meets the length policy. Length is
/// counted in characters, not bytes, so multibyte passwords are not
/// credited for their encoding.
pub fn acceptable(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Hashes a plaintext password with Argon2id and a freshly generated salt.
pub fn hash(password: &str) -> PasswordHash {
    let salt = SaltString::generate(&mut OsRng);

    let hash = DEFAULT_HASHER
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .serialize();

    PasswordHash(hash)
}

/// Verifies a password against a stored hash.
///
/// When no hash is available (unknown username), the password is still
/// verified against a fixed hash so the caller's timing does not reveal
/// whether the account exists.
pub fn verify(password: &str, maybe_hash: Option<&PasswordHash>) -> bool {
    let hash = maybe_hash.unwrap_or(&EMPTY_HASH);

    let matches = DEFAULT_HASHER
        .verify_password(password.as_bytes(), &hash.0.password_hash())
        .is_ok();

    // A request without a stored hash must always fail, even for "".
    matches && maybe_hash.is_some()
}
