//! # Request Authentication
//!
//! Every endpoint that moves value or runs a privileged vault operation
//! acts as the account behind an `Authorization: Bearer <key>` header.
//! Request bodies never name the caller.
//!
//! Keys are issued by `POST /accounts`, one per address, and cannot be
//! re-issued. The configured admin token is registered at startup as the
//! first admin identity; the vault's own authority check then decides what
//! that identity may do.

use std::collections::{HashMap, HashSet};

use axum::http::{header, HeaderMap};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use arca_protocol::Address;

/// Authentication and registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No usable `Authorization: Bearer` header.
    #[error("missing bearer credentials")]
    MissingCredentials,

    /// The bearer key was never issued by this node.
    #[error("unknown api key")]
    UnknownKey,

    /// The address already has a key.
    #[error("address {0} is already registered")]
    AddressTaken(Address),

    /// The address belongs to the vault's own machinery, or already holds
    /// value nobody has a key for.
    #[error("address {0} cannot be registered")]
    ReservedAddress(Address),
}

impl AuthError {
    /// Stable identifier for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "E101_MISSING_CREDENTIALS",
            AuthError::UnknownKey => "E102_UNKNOWN_KEY",
            AuthError::AddressTaken(_) => "E103_ADDRESS_TAKEN",
            AuthError::ReservedAddress(_) => "E104_RESERVED_ADDRESS",
        }
    }
}

#[derive(Default)]
struct Registry {
    by_key: HashMap<String, Address>,
    accounts: HashSet<Address>,
}

/// API key registry.
#[derive(Default)]
pub struct Credentials {
    inner: RwLock<Registry>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh key for `address`.
    ///
    /// # Errors
    ///
    /// [`AuthError::AddressTaken`] if the address already has a key.
    pub fn register(&self, address: &Address) -> Result<String, AuthError> {
        let key = Uuid::new_v4().simple().to_string();
        self.insert(key.clone(), address)?;
        Ok(key)
    }

    /// Binds a caller-chosen `key` to `address`. Used for the admin token.
    pub fn insert(&self, key: String, address: &Address) -> Result<(), AuthError> {
        let mut registry = self.inner.write();
        if !registry.accounts.insert(address.clone()) {
            return Err(AuthError::AddressTaken(address.clone()));
        }
        registry.by_key.insert(key, address.clone());
        Ok(())
    }

    /// `true` once `address` has a key.
    pub fn is_registered(&self, address: &Address) -> bool {
        self.inner.read().accounts.contains(address)
    }

    /// Resolves the bearer key in `headers` to its account.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Address, AuthError> {
        let key = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AuthError::MissingCredentials)?;
        self.inner
            .read()
            .by_key
            .get(key)
            .cloned()
            .ok_or(AuthError::UnknownKey)
    }
}
