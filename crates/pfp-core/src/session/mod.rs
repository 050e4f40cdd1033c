//! Authenticated session: cached cookie set, validation, interactive login.

mod cache;
mod credentials;
mod manager;

pub use cache::{SessionContext, SessionCookie};
pub use credentials::{ChainCredentials, CredentialProvider, Credentials, StaticCredentials};
pub use manager::{SessionError, SessionManager, SessionState};
