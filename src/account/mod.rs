//! Account credentials for the video platform API

pub mod credentials;
pub mod tokens;

pub use credentials::{AccountStore, Credential, CredentialError, DEFAULT_TOKEN_URI};
pub use tokens::AccountTokens;
