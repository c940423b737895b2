//! Extensions that sit on top of the manager, such as signing outbound API calls.

pub mod request_signer;

pub use request_signer::*;
