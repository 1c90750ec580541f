//! Auth-service wire types and session storage
//!
//! Everything the API client needs to know about the remote auth service
//! lives here: endpoint paths, the access/refresh credential pair, the
//! session store the pair is kept in, the refresh token exchange, and
//! decoding of access-token claims. The crate has no knowledge of request
//! authorization or refresh coordination; that lives in `api-client`.
//!
//! Session flow:
//! 1. Client posts email/password to `TOKEN_PATH`, receives a `TokenResponse`
//! 2. Issued pair stored via `SessionStore::set()`
//! 3. An expired access token is exchanged with `token::refresh_token()`
//! 4. Refreshed pair replaces the old one; a failed refresh clears the store

pub mod claims;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use claims::AccessClaims;
pub use constants::*;
pub use credentials::{CredentialPair, FileSessionStore, MemorySessionStore, SessionStore};
pub use error::{Error, Result};
pub use token::{TokenResponse, refresh_token};
