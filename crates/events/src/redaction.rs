//! Process-wide secret redaction.
//!
//! Secret parameter values are registered as soon as they are resolved so
//! that anything printed through [`crate::println_redacted`] never shows them.

use std::sync::{LazyLock, RwLock};

/// Values shorter than this are never redacted; they would mask ordinary
/// words and numbers.
pub const MIN_SECRET_LENGTH: usize = 4;

/// Text substituted for a secret.
pub const REDACTED_PLACEHOLDER: &str = "*_*";

static SECRETS: LazyLock<RwLock<SecretSet>> = LazyLock::new(|| RwLock::new(SecretSet::default()));

/// Secrets ordered longest first, so a secret containing another one is
/// replaced as a whole.
#[derive(Debug, Default)]
struct SecretSet {
    values: Vec<String>,
}

impl SecretSet {
    fn insert(&mut self, secret: String) {
        if secret.len() < MIN_SECRET_LENGTH || self.values.contains(&secret) {
            return;
        }
        let at = self
            .values
            .partition_point(|existing| existing.len() >= secret.len());
        self.values.insert(at, secret);
    }

    fn redact(&self, input: &str) -> String {
        self.values
            .iter()
            .fold(input.to_string(), |text, secret| {
                text.replace(secret.as_str(), REDACTED_PLACEHOLDER)
            })
    }
}

/// Register a secret value for redaction.
///
/// Values shorter than [`MIN_SECRET_LENGTH`] are ignored.
pub fn register_secret(secret: impl Into<String>) {
    if let Ok(mut set) = SECRETS.write() {
        set.insert(secret.into());
    }
}

/// Register several secret values.
pub fn register_secrets(secrets: impl IntoIterator<Item = impl Into<String>>) {
    if let Ok(mut set) = SECRETS.write() {
        for secret in secrets {
            set.insert(secret.into());
        }
    }
}

/// Replace every registered secret in `input` with [`REDACTED_PLACEHOLDER`].
#[must_use]
pub fn redact(input: &str) -> String {
    match SECRETS.read() {
        Ok(set) if !set.values.is_empty() => set.redact(input),
        _ => input.to_string(),
    }
}
