//! Shared types for the session-aware API client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
