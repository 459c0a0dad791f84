// src/accounts.rs — In-memory account store backing POST /register and POST /login.

use std::collections::HashMap;

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::info;

const SALT_LEN: usize = 16;
const HANDLE_SUFFIX_MAX: u32 = 10_000;
const HANDLE_ATTEMPTS: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AccountError {
    #[error("Registration failed: {0}")]
    InvalidInput(&'static str),

    #[error("Email already registered")]
    EmailTaken,

    #[error("No free handle for this name")]
    HandlesExhausted,

    #[error("User not found")]
    UnknownUser,

    #[error("Wrong password")]
    WrongPassword,
}

#[derive(Debug, Clone)]
struct Account {
    handle: String,
    /// `hex(salt):hex(sha256(salt || password))`
    password_hash: String,
}

/// Accounts keyed by normalised email.
#[derive(Default)]
pub struct AccountStore {
    by_email: RwLock<HashMap<String, Account>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account and returns its generated handle (`<name><0..10000>`).
    pub async fn create(&self, name: &str, email: &str, password: &str) -> Result<String, AccountError> {
        let base = handle_base(name);
        let email = normalise_email(email);
        if base.is_empty() {
            return Err(AccountError::InvalidInput("name must contain letters or digits"));
        }
        if !email.contains('@') {
            return Err(AccountError::InvalidInput("email is not valid"));
        }
        if password.is_empty() {
            return Err(AccountError::InvalidInput("password cannot be empty"));
        }

        let password_hash = hash_password(password);

        let mut map = self.by_email.write().await;
        if map.contains_key(&email) {
            return Err(AccountError::EmailTaken);
        }

        let handle = (0..HANDLE_ATTEMPTS)
            .map(|_| candidate_handle(&base))
            .find(|h| !map.values().any(|a| &a.handle == h))
            .ok_or(AccountError::HandlesExhausted)?;

        map.insert(email.clone(), Account {
            handle: handle.clone(),
            password_hash,
        });

        info!("[acct] '{handle}' registered for {} ({email})", name.trim());
        Ok(handle)
    }

    /// Checks a password and returns the account's handle.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<String, AccountError> {
        let map = self.by_email.read().await;
        let account = map.get(&normalise_email(email)).ok_or(AccountError::UnknownUser)?;
        if verify_password(&account.password_hash, password) {
            Ok(account.handle.clone())
        } else {
            Err(AccountError::WrongPassword)
        }
    }
}

fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn handle_base(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn candidate_handle(base: &str) -> String {
    let suffix = rand::rng().random_range(0..HANDLE_SUFFIX_MAX);
    format!("{base}{suffix}")
}

fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    format!("{}:{}", hex::encode(salt), hex::encode(digest(&salt, password)))
}

fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, expected)) = stored.split_once(':') else { return false };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    let actual = digest(&salt, password);
    expected.as_slice().ct_eq(&actual).into()
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_authenticate() {
        let store = AccountStore::new();
        let handle = store.create("Bob", "bob@example.com", "pw").await.unwrap();

        assert!(handle.starts_with("bob"));
        let suffix: u32 = handle["bob".len()..].parse().unwrap();
        assert!(suffix < HANDLE_SUFFIX_MAX);

        assert_eq!(store.authenticate(" BOB@example.com ", "pw").await.unwrap(), handle);
        assert_eq!(store.authenticate("bob@example.com", "nope").await, Err(AccountError::WrongPassword));
        assert_eq!(store.authenticate("eve@example.com", "pw").await, Err(AccountError::UnknownUser));
    }

    #[tokio::test]
    async fn email_is_unique() {
        let store = AccountStore::new();
        store.create("Bob", "bob@example.com", "pw").await.unwrap();
        assert_eq!(
            store.create("Robert", "Bob@Example.com", "pw2").await,
            Err(AccountError::EmailTaken)
        );
    }

    #[tokio::test]
    async fn rejects_unusable_input() {
        let store = AccountStore::new();
        assert!(matches!(store.create("  ", "a@b.c", "pw").await, Err(AccountError::InvalidInput(_))));
        assert!(matches!(store.create("Al", "nope", "pw").await, Err(AccountError::InvalidInput(_))));
        assert!(matches!(store.create("Al", "a@b.c", "").await, Err(AccountError::InvalidInput(_))));
    }

    #[test]
    fn handle_base_drops_spaces_and_lowercases() {
        assert_eq!(handle_base("Mary Jane"), "maryjane");
        assert_eq!(handle_base("dj_Ö-1"), "dj_ö-1");
    }

    #[test]
    fn password_hash_is_salted() {
        let a = hash_password("secret");
        let b = hash_password("secret");
        assert_ne!(a, b);
        assert!(verify_password(&a, "secret"));
        assert!(verify_password(&b, "secret"));
        assert!(!verify_password(&a, "Secret"));
        assert!(!verify_password("garbage", "secret"));

        let (salt, _) = a.split_once(':').unwrap();
        assert!(!verify_password(&format!("{salt}:abcd"), "secret"), "short digest never matches");
    }
}
