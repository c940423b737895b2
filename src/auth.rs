//! Credential records, scope sets, and redacted secrets.

pub mod credentials;
pub mod scope;
pub mod secret;

pub use credentials::*;
pub use scope::*;
pub use secret::*;
