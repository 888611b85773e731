//! Cove token layer.
//!
//! Tokens are EdDSA JWTs signed with rotating Ed25519 key pairs produced by
//! an external rotation job. The header's `kid` selects the public key out of
//! a JSON key map that is re-read on every verification, so a rotation takes
//! effect without a restart. Successful signs also record a time-boxed
//! allow-list entry; HTTP verification requires that entry to still exist,
//! which is what makes forced logout possible.

pub mod keys;
pub mod revocation;

pub use keys::{KeyStore, TokenError};
pub use revocation::AllowList;
