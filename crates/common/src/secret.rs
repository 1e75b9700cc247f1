//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. `SecretString` implements `Debug`
//! with redaction, so any struct that derives `Debug` while holding one gets
//! safe logging behavior for free; the inner value is only reachable through
//! an explicit `expose_secret()` call, and is zeroized on drop.
//!
//! Use `SecretString` for user passwords and any credential loaded from the
//! environment.

pub use secrecy::{ExposeSecret, SecretString};
