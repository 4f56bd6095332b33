//! Bitbucket OAuth credential library
//!
//! Resolves identities from git credential-helper parameters, stores one
//! credential record per identity on disk, and keeps each record's OAuth
//! token usable. This crate has no dependency on the helper binary; it can
//! be tested and used independently.
//!
//! Credential flow:
//! 1. `store`: `Identity::resolve_with_secrets()` + `CredentialStore::create()`
//! 2. `get`: `Identity::resolve()` + `CredentialStore::load()`
//! 3. `lifecycle::ensure_fresh_token()` issues, refreshes or reuses the token
//! 4. A new token is substituted with `CredentialRecord::with_token()` and
//!    saved via `CredentialStore::save()`
//! 5. `erase`: `CredentialStore::erase()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialRecord, CredentialStore};
pub use error::{Error, Result};
pub use identity::{Identity, Parameters, ValidationError};
pub use lifecycle::{Freshness, Renewal, ensure_fresh_token, ensure_fresh_token_at};
pub use token::{Token, TokenClient, TokenExchange};
