//! Authentication module for managing tokens and account state.
//!
//! This module provides:
//! - `TokenStore`: access/refresh token persistence with per-entry expiry,
//!   backed by memory, a JSON file or the OS keychain
//! - `Account`: the signed-in user's profile and the login/logout flows
//!
//! Access tokens expire after 1 hour, refresh tokens after 7 days.

pub mod account;
pub mod tokens;

pub use account::{Account, AccountError};
pub use tokens::{
    CredentialPair, FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenEntry, TokenKind,
    TokenStore, TokenStoreError,
};
