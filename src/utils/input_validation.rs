//! Validated wrapper types for untrusted account fields.

use derive_more::Display;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{2,19}$").expect("Failed to compile username regex")
});

// Deliberately permissive: one @, no whitespace, a dot in the domain.
// Anything stricter belongs to an email round trip, not a regex.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Failed to compile email regex")
});

#[derive(Debug, Clone, Copy, Display, Error)]
#[display("Invalid input")]
pub struct InvalidInput;

/// Wrapper type for a username that has been validated.
///
/// Usernames start with a letter, continue with letters, digits or
/// underscores, and are 3 to 20 characters long. Lookups are exact-match,
/// no case folding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct Username(String);

impl TryFrom<String> for Username {
    type Error = InvalidInput;

    fn try_from(username: String) -> Result<Self, Self::Error> {
        if USERNAME_REGEX.is_match(&username) {
            Ok(Self(username))
        } else {
            Err(InvalidInput)
        }
    }
}

impl TryFrom<&str> for Username {
    type Error = InvalidInput;

    fn try_from(username: &str) -> Result<Self, Self::Error> {
        Self::try_from(username.to_owned())
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Wrapper type for an email address that has been validated.
///
/// The address is trimmed and lowercased before the format check, so two
/// registrations differing only in case collide on the uniqueness check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct EmailAddress(String);

impl TryFrom<String> for EmailAddress {
    type Error = InvalidInput;

    fn try_from(email: String) -> Result<Self, Self::Error> {
        let email = email.trim().to_lowercase();
        if email.len() <= 254 && EMAIL_REGEX.is_match(&email) {
            Ok(Self(email))
        } else {
            Err(InvalidInput)
        }
    }
}

impl TryFrom<&str> for EmailAddress {
    type Error = InvalidInput;

    fn try_from(email: &str) -> Result<Self, Self::Error> {
        Self::try_from(email.to_owned())
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
